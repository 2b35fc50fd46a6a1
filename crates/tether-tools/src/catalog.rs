//! The renderer tool set

use crate::schema::{ToolParameter, ToolSchema};
use tether_core::gateway::ToolDescriptor;

/// A tool exposed by the gateway and the renderer-side name it runs as
#[derive(Debug, Clone, PartialEq)]
pub struct RendererTool {
    pub schema: ToolSchema,
    pub renderer_name: String,
}

impl RendererTool {
    pub fn new(renderer_name: impl Into<String>, schema: ToolSchema) -> Self {
        Self {
            schema,
            renderer_name: renderer_name.into(),
        }
    }

    /// Gateway-facing name
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        self.schema.descriptor()
    }
}

/// Named lookup over a fixed list of tools, kept in listing order
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<RendererTool>,
}

impl ToolCatalog {
    pub fn new(tools: Vec<RendererTool>) -> Self {
        Self { tools }
    }

    /// The six scene tools the renderer understands
    pub fn renderer() -> Self {
        Self::new(vec![
            set_scene_style(),
            spawn_object(),
            apply_physics(),
            clear_objects(),
            get_scene_status(),
            set_time_of_day(),
        ])
    }

    pub fn get(&self, name: &str) -> Option<&RendererTool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(RendererTool::name).collect()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(RendererTool::descriptor).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn set_scene_style() -> RendererTool {
    RendererTool::new(
        "setCathedralStyle",
        ToolSchema::new(
            "set_scene_style",
            "Update the visual style of the scene in real time",
            vec![
                ToolParameter::number("pinkIntensity", "Pink neon intensity (0.0-1.0)")
                    .optional()
                    .with_range(0.0, 1.0),
                ToolParameter::integer("eldritchLevel", "Eldritch power level (0-1000)")
                    .optional()
                    .with_range(0.0, 1000.0),
                ToolParameter::number("neonIntensity", "Neon light intensity (0-20)")
                    .optional()
                    .with_range(0.0, 20.0),
                ToolParameter::enumeration(
                    "lightingMode",
                    "Lighting mode",
                    ["neon", "nuclear", "holy", "cursed"],
                )
                .optional(),
            ],
        ),
    )
}

fn position(prefix: &str) -> Vec<ToolParameter> {
    ["x", "y", "z"]
        .into_iter()
        .map(|axis| {
            ToolParameter::number(axis, format!("{}{} position", prefix, axis.to_uppercase()))
        })
        .collect()
}

fn spawn_object() -> RendererTool {
    let mut parameters = vec![ToolParameter::enumeration(
        "objectType",
        "Type of object to spawn",
        ["sphere", "cube", "cylinder", "cross", "angel"],
    )];
    parameters.extend(position(""));
    parameters.push(ToolParameter::number("scale", "Object scale (default: 1.0)").with_default(1.0));
    parameters.push(ToolParameter::string("color", "Hex color (e.g., #FF00FF)").with_default("#FF00FF"));

    RendererTool::new(
        "spawnObject",
        ToolSchema::new("spawn_object", "Spawn an interactive 3D object in the scene", parameters),
    )
}

fn apply_physics() -> RendererTool {
    let mut parameters = vec![ToolParameter::enumeration(
        "action",
        "Physics action type",
        ["explode", "attract", "repel", "float"],
    )];
    parameters.extend(position("Center "));
    parameters.push(ToolParameter::number("force", "Force magnitude (default: 10)").with_default(10.0));
    parameters.push(ToolParameter::number("radius", "Effect radius (default: 10)").with_default(10.0));

    RendererTool::new(
        "applyPhysics",
        ToolSchema::new("apply_physics", "Apply physics forces to objects in the scene", parameters),
    )
}

fn clear_objects() -> RendererTool {
    RendererTool::new(
        "clearObjects",
        ToolSchema::new("clear_objects", "Remove all spawned objects from the scene", vec![]),
    )
}

fn get_scene_status() -> RendererTool {
    RendererTool::new(
        "getCathedralStatus",
        ToolSchema::new(
            "get_scene_status",
            "Get current status of the scene (style, objects, performance)",
            vec![],
        ),
    )
}

fn set_time_of_day() -> RendererTool {
    RendererTool::new(
        "setTimeOfDay",
        ToolSchema::new(
            "set_time_of_day",
            "Change the time of day lighting in the scene",
            vec![ToolParameter::number("hour", "Hour of day (0-24)").with_range(0.0, 24.0)],
        ),
    )
}

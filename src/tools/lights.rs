//! 智能家居灯光工具（LightAgent 使用）
//!
//! 内存中的灯光表 {id, name, is_on}；args.action 取 list / find / set / toggle / set_all。

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::Tool;

pub const LIGHTS_TOOL: &str = "lights";

/// 单盏灯
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Light {
    pub id: u32,
    pub name: String,
    pub is_on: bool,
}

/// 灯光表，可在工具与其它组件间共享
#[derive(Clone, Debug)]
pub struct LightStore {
    lights: Arc<RwLock<Vec<Light>>>,
}

impl LightStore {
    pub fn new(lights: Vec<Light>) -> Self {
        Self {
            lights: Arc::new(RwLock::new(lights)),
        }
    }

    pub fn list(&self) -> Vec<Light> {
        self.lights
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// 名称不区分大小写
    pub fn find(&self, name: &str) -> Option<Light> {
        let needle = name.trim().to_lowercase();
        self.list()
            .into_iter()
            .find(|l| l.name.to_lowercase() == needle)
    }

    pub fn set(&self, id: u32, is_on: bool) -> Option<Light> {
        let mut lights = self
            .lights
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let light = lights.iter_mut().find(|l| l.id == id)?;
        light.is_on = is_on;
        Some(light.clone())
    }

    pub fn toggle(&self, id: u32) -> Option<Light> {
        let current = self.list().into_iter().find(|l| l.id == id)?;
        self.set(id, !current.is_on)
    }

    pub fn set_all(&self, is_on: bool) -> Vec<Light> {
        let mut lights = self
            .lights
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for light in lights.iter_mut() {
            light.is_on = is_on;
        }
        lights.clone()
    }
}

impl Default for LightStore {
    fn default() -> Self {
        Self::new(vec![
            Light {
                id: 1,
                name: "Table Lamp".into(),
                is_on: false,
            },
            Light {
                id: 2,
                name: "Porch light".into(),
                is_on: false,
            },
            Light {
                id: 3,
                name: "Chandelier".into(),
                is_on: true,
            },
        ])
    }
}

/// 灯光控制工具
pub struct LightTool {
    store: LightStore,
}

impl LightTool {
    pub fn new(store: LightStore) -> Self {
        Self { store }
    }

    fn resolve_id(&self, args: &Value) -> Result<u32, String> {
        if let Some(id) = args.get("id").and_then(Value::as_u64) {
            return Ok(id as u32);
        }
        let name = args
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| "expected 'id' or 'name'".to_string())?;
        self.store
            .find(name)
            .map(|l| l.id)
            .ok_or_else(|| format!("Light '{name}' not found"))
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| e.to_string())
}

#[async_trait]
impl Tool for LightTool {
    fn name(&self) -> &str {
        LIGHTS_TOOL
    }

    fn description(&self) -> &str {
        "Control smart home lights. Args: {\"action\": \"list|find|set|toggle|set_all\", \"id\"?: 1, \"name\"?: \"Table Lamp\", \"is_on\"?: true}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["list", "find", "set", "toggle", "set_all"]},
                "id": {"type": "integer"},
                "name": {"type": "string"},
                "is_on": {"type": "boolean"}
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let action = args.get("action").and_then(Value::as_str).unwrap_or("list");
        let is_on = args.get("is_on").and_then(Value::as_bool);
        match action {
            "list" => to_json(&self.store.list()),
            "find" => {
                let id = self.resolve_id(&args)?;
                let light = self.store.list().into_iter().find(|l| l.id == id);
                to_json(&light)
            }
            "set" => {
                let is_on = is_on.ok_or_else(|| "'set' requires 'is_on'".to_string())?;
                let id = self.resolve_id(&args)?;
                let light = self.store.set(id, is_on).ok_or_else(|| format!("Light {id} not found"))?;
                to_json(&light)
            }
            "toggle" => {
                let id = self.resolve_id(&args)?;
                let light = self.store.toggle(id).ok_or_else(|| format!("Light {id} not found"))?;
                to_json(&light)
            }
            "set_all" => {
                let is_on = is_on.ok_or_else(|| "'set_all' requires 'is_on'".to_string())?;
                to_json(&self.store.set_all(is_on))
            }
            other => Err(format!("Unknown action '{other}'")),
        }
    }
}

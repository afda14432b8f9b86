/// Debug inspector contract
///
/// An external tool talks to a running engine over a pair of channels. The
/// engine sends a `SceneSnapshot` when the tool attaches and answers every
/// request; the tool sends JSON-compatible requests tagged by `action`:
///
/// ```json
/// {"action": "update_uniform", "component_type": "object", "id": 0,
///  "uniform": "color", "field": "value", "value": [1.0, 0.0, 0.0, 1.0]}
/// ```
///
/// An accepted update goes through the same setter as an application write,
/// so it reaches the GPU on the next flush.

use std::collections::BTreeMap;
use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};
use serde::{Deserialize, Serialize};

use crate::compiler::{DataScene, UniformOwner};
use crate::error::{Error, Result};
use crate::layout::FieldValue;
use crate::scene::{ObjectId, ProgramId, Scene, ShaderId, UniformValue, Uniforms};

// ============================================================================
// Protocol
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    Object,
    Shader,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InspectorRequest {
    UpdateUniform {
        component_type: ComponentType,
        id: usize,
        uniform: String,
        field: String,
        value: serde_json::Value,
    },
    /// Ask for a fresh snapshot of the attached scene
    Snapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InspectorEvent {
    Scene(SceneSnapshot),
    Applied {
        component_type: ComponentType,
        id: usize,
        uniform: String,
        field: String,
    },
    Rejected {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniformSnapshot {
    Fields(BTreeMap<String, serde_json::Value>),
    Image { image: usize, view: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSnapshot {
    pub id: usize,
    pub name: String,
    pub uniforms: BTreeMap<String, UniformSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub name: String,
    pub objects: Vec<ComponentSnapshot>,
    pub shaders: Vec<ComponentSnapshot>,
    pub meshes: Vec<String>,
    pub images: Vec<String>,
    pub samplers: Vec<String>,
}

fn field_json(value: &FieldValue) -> serde_json::Value {
    match value {
        FieldValue::Int(v) => serde_json::json!(v),
        FieldValue::Float(v) => serde_json::json!(v),
    }
}

fn component(id: usize, name: &str, uniforms: &Uniforms) -> ComponentSnapshot {
    let uniforms = uniforms
        .names()
        .filter_map(|uniform| {
            let snapshot = match uniforms.get(uniform)? {
                UniformValue::Block(fields) => UniformSnapshot::Fields(
                    fields.iter().map(|(k, v)| (k.clone(), field_json(v))).collect(),
                ),
                UniformValue::Image(binding) => UniformSnapshot::Image {
                    image: binding.image().0,
                    view: binding.view().to_string(),
                },
            };
            Some((uniform.to_string(), snapshot))
        })
        .collect();
    ComponentSnapshot { id, name: name.to_string(), uniforms }
}

impl SceneSnapshot {
    pub fn capture(scene: &Scene) -> Self {
        Self {
            name: scene.name.clone(),
            objects: scene.objects().iter().enumerate().map(|(i, o)| component(i, &o.name, &o.uniforms)).collect(),
            shaders: scene.shaders().iter().enumerate().map(|(i, s)| component(i, &s.name, &s.uniforms)).collect(),
            meshes: scene.meshes().iter().map(|m| m.name.clone()).collect(),
            images: scene.images().iter().map(|i| i.name.clone()).collect(),
            samplers: scene.samplers().iter().map(|s| s.name.clone()).collect(),
        }
    }
}

/// Apply an `update_uniform` request to `scene`
///
/// The value is checked against the compiled struct layout so a malformed
/// request is rejected here instead of failing the next flush.
pub fn apply_update(
    scene: &mut Scene,
    data: &DataScene,
    component_type: ComponentType,
    id: usize,
    uniform: &str,
    field: &str,
    value: &serde_json::Value,
) -> Result<()> {
    let owner = match component_type {
        ComponentType::Object => UniformOwner::Object(ObjectId(id)),
        ComponentType::Shader => UniformOwner::Program(ProgramId::Shader(ShaderId(id))),
    };
    let layout = data.uniform_struct(owner, uniform).ok_or_else(|| {
        Error::InvalidResource(format!("{:?} {} has no buffer uniform '{}'", component_type, id, uniform))
    })?;
    let member = layout.field(field).ok_or_else(|| {
        Error::InvalidResource(format!("Uniform '{}' has no field '{}'", uniform, field))
    })?;
    let parsed = FieldValue::from_json(value, member.member_type.scalar())
        .filter(|v| v.len() == member.elements())
        .ok_or_else(|| {
            Error::InvalidResource(format!(
                "Value {} does not fit {}.{} ({} element(s))", value, uniform, field, member.elements()
            ))
        })?;

    match component_type {
        ComponentType::Object => scene.update_object(ObjectId(id), |u| u.set_field(uniform, field, parsed)),
        ComponentType::Shader => scene.update_shader(ShaderId(id), |u| u.set_field(uniform, field, parsed)),
    }
}

// ============================================================================
// Channels
// ============================================================================

/// Engine side of an inspector connection
#[derive(Debug)]
pub struct InspectorLink {
    requests: Receiver<InspectorRequest>,
    events: Sender<InspectorEvent>,
}

/// Tool side of an inspector connection
#[derive(Debug, Clone)]
pub struct InspectorClient {
    requests: Sender<InspectorRequest>,
    events: Receiver<InspectorEvent>,
}

pub fn inspector_channel() -> (InspectorLink, InspectorClient) {
    let (request_tx, request_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    (
        InspectorLink { requests: request_rx, events: event_tx },
        InspectorClient { requests: request_tx, events: event_rx },
    )
}

impl InspectorLink {
    /// Returns false once the tool hung up
    pub fn send(&self, event: InspectorEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Every request received so far, and whether the tool is still connected
    pub fn drain(&self) -> (Vec<InspectorRequest>, bool) {
        let mut requests = Vec::new();
        loop {
            match self.requests.try_recv() {
                Ok(request) => requests.push(request),
                Err(TryRecvError::Empty) => return (requests, true),
                Err(TryRecvError::Disconnected) => return (requests, false),
            }
        }
    }
}

impl InspectorClient {
    pub fn send(&self, request: InspectorRequest) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| Error::BackendError("Inspector link closed".to_string()))
    }

    /// Send a raw JSON request as produced by an external tool
    pub fn send_json(&self, json: &str) -> Result<()> {
        let request = serde_json::from_str(json)
            .map_err(|e| Error::InvalidResource(format!("Malformed inspector request: {}", e)))?;
        self.send(request)
    }

    pub fn try_event(&self) -> Option<InspectorEvent> {
        self.events.try_recv().ok()
    }

    pub fn events(&self) -> Vec<InspectorEvent> {
        self.events.try_iter().collect()
    }
}

#[cfg(test)]
#[path = "inspector_tests.rs"]
mod tests;

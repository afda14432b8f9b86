/// Inspector module - debug tool protocol and channels

pub mod inspector;

pub use inspector::{
    apply_update, inspector_channel, ComponentSnapshot, ComponentType, InspectorClient, InspectorEvent,
    InspectorLink, InspectorRequest, SceneSnapshot, UniformSnapshot,
};

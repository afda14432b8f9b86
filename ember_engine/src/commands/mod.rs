/// Commands module - one-shot uploads, device commands and compute dispatch

pub mod one_shot;
pub mod device_command;
pub mod compute_runner;

pub use one_shot::submit_one_shot;
pub use device_command::{DeviceCommand, DeviceCommandList, LayoutTracker, stage_for_access};
pub use compute_runner::{
    ComputeRunner, ComputeRequest, ComputeCallback, ComputeTicket, DispatchOutcome,
};

use ash::vk;
use crate::config::{Config, QueueRequirement, RENDER_QUEUE, COMPUTE_QUEUE};

#[test]
fn test_default_queues() {
    let config = Config::default();

    let render = config.queue(RENDER_QUEUE).unwrap();
    assert!(render.required);
    assert!(render.flags.contains(vk::QueueFlags::GRAPHICS));

    let compute = config.queue(COMPUTE_QUEUE).unwrap();
    assert!(!compute.required);
    assert!(compute.flags.contains(vk::QueueFlags::COMPUTE));

    assert!(config.queue("transfer").is_none());
}

#[test]
fn test_default_clear_values() {
    let config = Config::default();
    assert_eq!(config.clear_color, [0.2, 0.2, 0.2, 1.0]);
    assert_eq!(config.clear_depth, 1.0);
}

#[test]
fn test_custom_queue_requirement() {
    let mut config = Config::default();
    config.queues.push(QueueRequirement::optional("transfer", vk::QueueFlags::TRANSFER));
    assert_eq!(config.queue("transfer").unwrap().name, "transfer");
}

/// Queue family selection for named queue requirements
///
/// The render queue takes the first family that supports graphics and can
/// present to the surface. Every other requirement prefers a different
/// family, choosing the most specialized one (no graphics, fewest
/// capabilities). Requirements no other family satisfies alias the render
/// family; a required queue the render family cannot serve either is fatal.

use ash::vk;
use ember_engine::config::{QueueRequirement, RENDER_QUEUE};
use ember_engine::ember::{Error, Result};
use ember_engine::{engine_debug, engine_error};

/// A requirement resolved to a queue family (queue index 0)
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueueAssignment {
    pub name: String,
    pub family: u32,
}

pub(crate) fn select_queue_families(
    families: &[vk::QueueFamilyProperties],
    requirements: &[QueueRequirement],
    can_present: impl Fn(u32) -> bool,
) -> Result<Vec<QueueAssignment>> {
    let render_flags = requirements
        .iter()
        .find(|r| r.name == RENDER_QUEUE)
        .map(|r| r.flags | vk::QueueFlags::GRAPHICS)
        .unwrap_or(vk::QueueFlags::GRAPHICS);

    let render_family = (0..families.len() as u32)
        .find(|&i| families[i as usize].queue_flags.contains(render_flags) && can_present(i))
        .ok_or_else(|| {
            engine_error!("ember::vulkan", "No queue family supports graphics and presentation");
            Error::InitializationFailed("No queue family supports graphics and presentation".to_string())
        })?;

    let mut assignments = vec![QueueAssignment { name: RENDER_QUEUE.to_string(), family: render_family }];

    for requirement in requirements.iter().filter(|r| r.name != RENDER_QUEUE) {
        let dedicated = (0..families.len() as u32)
            .filter(|&i| i != render_family && families[i as usize].queue_flags.contains(requirement.flags))
            .min_by_key(|&i| {
                let flags = families[i as usize].queue_flags;
                (flags.contains(vk::QueueFlags::GRAPHICS), flags.as_raw().count_ones())
            });

        let family = match dedicated {
            Some(family) => family,
            None => {
                let render_supports = families[render_family as usize].queue_flags.contains(requirement.flags);
                if requirement.required && !render_supports {
                    engine_error!("ember::vulkan",
                        "Required queue '{}' ({:?}) is not supported by the device", requirement.name, requirement.flags);
                    return Err(Error::InitializationFailed(format!(
                        "Required queue '{}' is not supported by the device", requirement.name
                    )));
                }
                engine_debug!("ember::vulkan",
                    "Queue '{}' has no dedicated family, aliasing the render queue", requirement.name);
                render_family
            }
        };
        assignments.push(QueueAssignment { name: requirement.name.clone(), family });
    }

    Ok(assignments)
}

#[cfg(test)]
#[path = "vulkan_queues_tests.rs"]
mod tests;

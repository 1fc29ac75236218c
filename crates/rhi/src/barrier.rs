//! Image layout transitions.
//!
//! Every supported `(old, new)` layout pair maps to the narrowest stage and
//! access masks that order it correctly. Pairs outside the table are an
//! error rather than a silent `ALL_COMMANDS` barrier.

use ash::vk;

use crate::command::CommandBuffer;
use crate::error::{RhiError, RhiResult};

/// Stage and access masks for one side of a transition each.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub dst_access: vk::AccessFlags,
}

impl TransitionMasks {
    const fn new(
        src_stage: vk::PipelineStageFlags,
        src_access: vk::AccessFlags,
        dst_stage: vk::PipelineStageFlags,
        dst_access: vk::AccessFlags,
    ) -> Self {
        Self {
            src_stage,
            src_access,
            dst_stage,
            dst_access,
        }
    }
}

const DEPTH_TESTS: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
    vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS.as_raw()
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS.as_raw(),
);

const SHADER_READERS: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
    vk::PipelineStageFlags::FRAGMENT_SHADER.as_raw()
        | vk::PipelineStageFlags::COMPUTE_SHADER.as_raw(),
);

/// Looks up the masks for a layout transition.
///
/// Attachments coming from `UNDEFINED` still wait on the previous frame's
/// attachment writes, since the multisample color and depth images are
/// shared by every frame slot.
pub fn transition_masks(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RhiResult<TransitionMasks> {
    use vk::AccessFlags as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags as S;

    let masks = match (old, new) {
        (L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL) => TransitionMasks::new(
            S::COLOR_ATTACHMENT_OUTPUT,
            A::COLOR_ATTACHMENT_WRITE,
            S::COLOR_ATTACHMENT_OUTPUT,
            A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE,
        ),
        (L::UNDEFINED, L::DEPTH_ATTACHMENT_OPTIMAL)
        | (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => TransitionMasks::new(
            DEPTH_TESTS,
            A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            DEPTH_TESTS,
            A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        (L::COLOR_ATTACHMENT_OPTIMAL, L::PRESENT_SRC_KHR) => TransitionMasks::new(
            S::COLOR_ATTACHMENT_OUTPUT,
            A::COLOR_ATTACHMENT_WRITE,
            S::BOTTOM_OF_PIPE,
            A::empty(),
        ),
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => TransitionMasks::new(
            S::TOP_OF_PIPE,
            A::empty(),
            S::TRANSFER,
            A::TRANSFER_WRITE,
        ),
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => TransitionMasks::new(
            S::TRANSFER,
            A::TRANSFER_WRITE,
            SHADER_READERS,
            A::SHADER_READ,
        ),
        (L::UNDEFINED, L::GENERAL) => TransitionMasks::new(
            S::TOP_OF_PIPE,
            A::empty(),
            S::COMPUTE_SHADER,
            A::SHADER_WRITE,
        ),
        (L::GENERAL, L::TRANSFER_SRC_OPTIMAL) => TransitionMasks::new(
            S::COMPUTE_SHADER,
            A::SHADER_WRITE,
            S::TRANSFER,
            A::TRANSFER_READ,
        ),
        (L::GENERAL, L::SHADER_READ_ONLY_OPTIMAL) => TransitionMasks::new(
            S::COMPUTE_SHADER,
            A::SHADER_WRITE,
            SHADER_READERS,
            A::SHADER_READ,
        ),
        (L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => TransitionMasks::new(
            S::TRANSFER,
            A::empty(),
            SHADER_READERS,
            A::SHADER_READ,
        ),
        _ => return Err(RhiError::UnsupportedLayoutTransition { old, new }),
    };
    Ok(masks)
}

/// Builds the barrier for a table transition over `range`.
pub fn layout_barrier(
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RhiResult<(TransitionMasks, vk::ImageMemoryBarrier<'static>)> {
    let masks = transition_masks(old, new)?;
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access);
    Ok((masks, barrier))
}

/// Records a single table transition.
pub fn transition(
    cmd: &CommandBuffer,
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RhiResult<()> {
    let (masks, barrier) = layout_barrier(image, range, old, new)?;
    cmd.pipeline_barrier(masks.src_stage, masks.dst_stage, &[barrier]);
    Ok(())
}

/// Makes compute writes to `range` visible to later compute reads, staying
/// in `GENERAL`.
pub fn compute_write_to_read(
    cmd: &CommandBuffer,
    image: vk::Image,
    range: vk::ImageSubresourceRange,
) {
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(vk::ImageLayout::GENERAL)
        .new_layout(vk::ImageLayout::GENERAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(vk::AccessFlags::SHADER_WRITE)
        .dst_access_mask(vk::AccessFlags::SHADER_READ);
    cmd.pipeline_barrier(
        vk::PipelineStageFlags::COMPUTE_SHADER,
        vk::PipelineStageFlags::COMPUTE_SHADER,
        &[barrier],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    use vk::ImageLayout as L;
    use vk::PipelineStageFlags as S;

    const TABLE: [(vk::ImageLayout, vk::ImageLayout); 10] = [
        (L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL),
        (L::UNDEFINED, L::DEPTH_ATTACHMENT_OPTIMAL),
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        (L::COLOR_ATTACHMENT_OPTIMAL, L::PRESENT_SRC_KHR),
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL),
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL),
        (L::UNDEFINED, L::GENERAL),
        (L::GENERAL, L::TRANSFER_SRC_OPTIMAL),
        (L::GENERAL, L::SHADER_READ_ONLY_OPTIMAL),
        (L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL),
    ];

    #[test]
    fn test_no_entry_uses_all_commands() {
        for (old, new) in TABLE {
            let masks = transition_masks(old, new).unwrap();
            assert!(!masks.src_stage.contains(S::ALL_COMMANDS), "{old:?}->{new:?}");
            assert!(!masks.dst_stage.contains(S::ALL_COMMANDS), "{old:?}->{new:?}");
            assert!(!masks.src_stage.is_empty());
            assert!(!masks.dst_stage.is_empty());
        }
    }

    #[test]
    fn test_color_attachment_waits_on_output_stage() {
        let masks = transition_masks(L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL).unwrap();
        assert_eq!(masks.src_stage, S::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(masks.dst_stage, S::COLOR_ATTACHMENT_OUTPUT);
        assert!(masks.dst_access.contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
    }

    #[test]
    fn test_depth_covers_both_test_stages() {
        for new in [L::DEPTH_ATTACHMENT_OPTIMAL, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL] {
            let masks = transition_masks(L::UNDEFINED, new).unwrap();
            // The load-op clear writes in the early stage, stores in the late one.
            for stages in [masks.src_stage, masks.dst_stage] {
                assert!(stages.contains(S::EARLY_FRAGMENT_TESTS));
                assert!(stages.contains(S::LATE_FRAGMENT_TESTS));
            }
            assert!(
                masks
                    .dst_access
                    .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
            );
        }
    }

    #[test]
    fn test_present_releases_to_bottom_of_pipe() {
        let masks = transition_masks(L::COLOR_ATTACHMENT_OPTIMAL, L::PRESENT_SRC_KHR).unwrap();
        assert_eq!(masks.dst_stage, S::BOTTOM_OF_PIPE);
        assert!(masks.dst_access.is_empty());
    }

    #[test]
    fn test_unknown_pair_is_rejected() {
        let err = transition_masks(L::PRESENT_SRC_KHR, L::GENERAL).unwrap_err();
        assert!(matches!(
            err,
            RhiError::UnsupportedLayoutTransition {
                old: L::PRESENT_SRC_KHR,
                new: L::GENERAL
            }
        ));
    }

    #[test]
    fn test_layout_barrier_carries_range_and_masks() {
        let range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 3,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 6,
        };
        let (masks, barrier) =
            layout_barrier(vk::Image::null(), range, L::GENERAL, L::TRANSFER_SRC_OPTIMAL)
                .unwrap();
        assert_eq!(barrier.subresource_range.base_mip_level, 3);
        assert_eq!(barrier.subresource_range.layer_count, 6);
        assert_eq!(barrier.src_access_mask, masks.src_access);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags::TRANSFER_READ);
    }
}

use ash::vk;
use crate::renderer::error::{RenderError, RenderResult};

type Layout = vk::ImageLayout;
type Access = vk::AccessFlags;
type Stage = vk::PipelineStageFlags;

/// Access masks and stages for one supported image layout change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

impl LayoutTransition {
    const fn edge(
        old_layout: Layout,
        new_layout: Layout,
        src_access: Access,
        dst_access: Access,
        src_stage: Stage,
        dst_stage: Stage,
    ) -> Self {
        Self { old_layout, new_layout, src_access, dst_access, src_stage, dst_stage }
    }

    /// Looks up the barrier parameters for `from -> to`.
    ///
    /// Only the edges the renderer walks are known: texture upload, the one-time attachment
    /// setup and the per-frame blit into the presentable image. Anything else is rejected.
    pub fn between(from: vk::ImageLayout, to: vk::ImageLayout) -> RenderResult<Self> {
        let color_rw = Access::COLOR_ATTACHMENT_READ | Access::COLOR_ATTACHMENT_WRITE;
        let depth_rw = Access::DEPTH_STENCIL_ATTACHMENT_READ
            | Access::DEPTH_STENCIL_ATTACHMENT_WRITE;

        let transition = match (from, to) {
            (Layout::UNDEFINED, Layout::TRANSFER_DST_OPTIMAL) => Self::edge(
                from, to,
                Access::empty(), Access::TRANSFER_WRITE,
                Stage::TOP_OF_PIPE, Stage::TRANSFER,
            ),
            (Layout::TRANSFER_DST_OPTIMAL, Layout::SHADER_READ_ONLY_OPTIMAL) => Self::edge(
                from, to,
                Access::TRANSFER_WRITE, Access::SHADER_READ,
                Stage::TRANSFER, Stage::FRAGMENT_SHADER,
            ),
            (Layout::UNDEFINED, Layout::COLOR_ATTACHMENT_OPTIMAL) => Self::edge(
                from, to,
                Access::empty(), color_rw,
                Stage::TOP_OF_PIPE, Stage::COLOR_ATTACHMENT_OUTPUT,
            ),
            (Layout::UNDEFINED, Layout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => Self::edge(
                from, to,
                Access::empty(), depth_rw,
                Stage::TOP_OF_PIPE,
                Stage::EARLY_FRAGMENT_TESTS | Stage::LATE_FRAGMENT_TESTS,
            ),
            (Layout::COLOR_ATTACHMENT_OPTIMAL, Layout::TRANSFER_SRC_OPTIMAL) => Self::edge(
                from, to,
                color_rw, Access::TRANSFER_READ,
                Stage::COLOR_ATTACHMENT_OUTPUT, Stage::TRANSFER,
            ),
            (Layout::TRANSFER_SRC_OPTIMAL, Layout::COLOR_ATTACHMENT_OPTIMAL) => Self::edge(
                from, to,
                Access::TRANSFER_READ, color_rw,
                Stage::TRANSFER, Stage::COLOR_ATTACHMENT_OUTPUT,
            ),
            // The image was handed back by a fence-waited acquire, nothing to wait on
            (Layout::PRESENT_SRC_KHR, Layout::TRANSFER_DST_OPTIMAL) => Self::edge(
                from, to,
                Access::empty(), Access::TRANSFER_WRITE,
                Stage::TOP_OF_PIPE, Stage::TRANSFER,
            ),
            (Layout::TRANSFER_DST_OPTIMAL, Layout::PRESENT_SRC_KHR) => Self::edge(
                from, to,
                Access::TRANSFER_WRITE, Access::empty(),
                Stage::TRANSFER, Stage::BOTTOM_OF_PIPE,
            ),
            _ => return Err(RenderError::UnsupportedLayoutTransition { from, to }),
        };

        Ok(transition)
    }

    pub fn barrier(
        &self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
    ) -> vk::ImageMemoryBarrier<'static> {
        vk::ImageMemoryBarrier::default()
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_access_mask(self.src_access)
            .dst_access_mask(self.dst_access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(full_subresource_range(aspect))
    }

    pub fn record(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
    ) {
        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                self.src_stage,
                self.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[self.barrier(image, aspect)],
            );
        }
    }
}

/// Records `*layout -> to` for `image` and updates the tracked layout.
///
/// On an unsupported pair nothing is recorded and `layout` is left untouched.
pub fn record_transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    layout: &mut vk::ImageLayout,
    to: vk::ImageLayout,
) -> RenderResult<LayoutTransition> {
    let transition = advance_layout(layout, to)?;
    transition.record(device, cmd, image, aspect);
    Ok(transition)
}

/// Looks up `*layout -> to` and moves the tracked layout to `to` if the edge is known
pub fn advance_layout(
    layout: &mut vk::ImageLayout,
    to: vk::ImageLayout,
) -> RenderResult<LayoutTransition> {
    let transition = LayoutTransition::between(*layout, to)?;
    *layout = to;
    Ok(transition)
}

pub fn full_subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_upload_edges_match_table() {
        let to_transfer =
            LayoutTransition::between(Layout::UNDEFINED, Layout::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(to_transfer.src_access, Access::empty());
        assert_eq!(to_transfer.dst_access, Access::TRANSFER_WRITE);
        assert_eq!(to_transfer.src_stage, Stage::TOP_OF_PIPE);
        assert_eq!(to_transfer.dst_stage, Stage::TRANSFER);

        let to_sampled = LayoutTransition::between(
            Layout::TRANSFER_DST_OPTIMAL,
            Layout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_sampled.src_access, Access::TRANSFER_WRITE);
        assert_eq!(to_sampled.dst_access, Access::SHADER_READ);
        assert_eq!(to_sampled.src_stage, Stage::TRANSFER);
        assert_eq!(to_sampled.dst_stage, Stage::FRAGMENT_SHADER);
    }

    #[test]
    fn unknown_pairs_are_rejected() {
        for (from, to) in [
            (Layout::SHADER_READ_ONLY_OPTIMAL, Layout::UNDEFINED),
            (Layout::SHADER_READ_ONLY_OPTIMAL, Layout::TRANSFER_DST_OPTIMAL),
            (Layout::UNDEFINED, Layout::SHADER_READ_ONLY_OPTIMAL),
            (Layout::GENERAL, Layout::PRESENT_SRC_KHR),
            (Layout::TRANSFER_DST_OPTIMAL, Layout::TRANSFER_DST_OPTIMAL),
        ] {
            match LayoutTransition::between(from, to) {
                Err(RenderError::UnsupportedLayoutTransition { from: f, to: t }) => {
                    assert_eq!((f, t), (from, to));
                }
                other => panic!("{:?} -> {:?} gave {:?}", from, to, other),
            }
        }
    }

    #[test]
    fn tracked_layout_follows_known_edges() {
        let mut layout = Layout::UNDEFINED;
        let transition = advance_layout(&mut layout, Layout::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(transition.old_layout, Layout::UNDEFINED);
        assert_eq!(layout, Layout::TRANSFER_DST_OPTIMAL);

        advance_layout(&mut layout, Layout::PRESENT_SRC_KHR).unwrap();
        assert_eq!(layout, Layout::PRESENT_SRC_KHR);
    }

    #[test]
    fn tracked_layout_is_kept_on_unknown_edge() {
        let mut layout = Layout::PRESENT_SRC_KHR;
        let result = advance_layout(&mut layout, Layout::SHADER_READ_ONLY_OPTIMAL);
        assert!(matches!(result, Err(RenderError::UnsupportedLayoutTransition { .. })));
        assert_eq!(layout, Layout::PRESENT_SRC_KHR);
    }

    #[test]
    fn barrier_carries_table_entry() {
        let transition = LayoutTransition::between(
            Layout::COLOR_ATTACHMENT_OPTIMAL,
            Layout::TRANSFER_SRC_OPTIMAL,
        )
        .unwrap();
        let barrier = transition.barrier(vk::Image::null(), vk::ImageAspectFlags::COLOR);
        assert_eq!(barrier.old_layout, Layout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.new_layout, Layout::TRANSFER_SRC_OPTIMAL);
        assert_eq!(barrier.dst_access_mask, Access::TRANSFER_READ);
        assert_eq!(barrier.subresource_range.layer_count, 1);
        assert_eq!(barrier.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
    }

    #[test]
    fn blit_round_trip_returns_to_start() {
        let color = [Layout::COLOR_ATTACHMENT_OPTIMAL, Layout::TRANSFER_SRC_OPTIMAL];
        let present = [Layout::PRESENT_SRC_KHR, Layout::TRANSFER_DST_OPTIMAL];
        for [a, b] in [color, present] {
            assert!(LayoutTransition::between(a, b).is_ok());
            assert!(LayoutTransition::between(b, a).is_ok());
        }
    }
}

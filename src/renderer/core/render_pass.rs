use std::sync::Arc;
use ash::vk;
use crate::renderer::core::device::RenderDevice;
use crate::renderer::error::RenderResult;
use crate::renderer::resources::image::{
    ImageResource, COLOR_ATTACHMENT_FORMAT, DEPTH_ATTACHMENT_FORMAT,
};

/// Color and depth attachments the scene is drawn into before being blitted to the swapchain
pub struct OffscreenTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub color: ImageResource,
    pub depth: ImageResource,
    device: Arc<ash::Device>,
}

impl OffscreenTarget {
    pub fn new(device: &RenderDevice, extent: vk::Extent2D) -> RenderResult<Self> {
        let logical = device.logical.clone();
        let color = ImageResource::new_color_attachment(device, extent)?;
        let depth = ImageResource::new_depth_attachment(device, extent)?;

        let render_pass = create_render_pass(&logical)?;
        let attachments = [color.view, depth.view];
        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let framebuffer = match unsafe { logical.create_framebuffer(&framebuffer_info, None) } {
            Ok(framebuffer) => framebuffer,
            Err(e) => {
                unsafe { logical.destroy_render_pass(render_pass, None) };
                return Err(e.into());
            }
        };

        Ok(Self {
            render_pass,
            framebuffer,
            color,
            depth,
            device: logical,
        })
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.color.extent_2d()
    }

    /// Moves both attachments out of UNDEFINED. Recorded once, before the first frame.
    pub fn prepare_attachments(&mut self, cmd: vk::CommandBuffer) -> RenderResult<()> {
        self.color.transition(cmd, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)?;
        self.depth.transition(cmd, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)?;
        Ok(())
    }

    pub fn begin(&self, cmd: vk::CommandBuffer, clear_color: [f32; 4]) {
        let clear_values = clear_values(clear_color);
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(self.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.extent(),
            })
            .clear_values(&clear_values);
        unsafe {
            self.device.cmd_begin_render_pass(cmd, &info, vk::SubpassContents::INLINE);
        }
    }

    pub fn end(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) };
    }
}

impl Drop for OffscreenTarget {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

/// Depth clears to 0.0, the far plane of the reversed-Z projection
pub fn clear_values(clear_color: [f32; 4]) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue { float32: clear_color },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth: 0.0, stencil: 0 },
        },
    ]
}

fn attachment_descriptions() -> [vk::AttachmentDescription; 2] {
    let color = vk::AttachmentDescription::default()
        .format(COLOR_ATTACHMENT_FORMAT)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    let depth = vk::AttachmentDescription::default()
        .format(DEPTH_ATTACHMENT_FORMAT)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::CLEAR)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    [color, depth]
}

fn create_render_pass(device: &ash::Device) -> RenderResult<vk::RenderPass> {
    let attachments = attachment_descriptions();

    let color_ref = vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    let depth_ref = vk::AttachmentReference::default()
        .attachment(1)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(std::slice::from_ref(&color_ref))
        .depth_stencil_attachment(&depth_ref);

    // The previous frame's blit reads the color attachment, and its depth writes must land
    // before this frame clears
    let dependency = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(
            vk::PipelineStageFlags::TRANSFER
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        )
        .src_access_mask(
            vk::AccessFlags::TRANSFER_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
        .dst_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        );

    let subpasses = [subpass];
    let dependencies = [dependency];
    let info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    Ok(unsafe { device.create_render_pass(&info, None)? })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachments_keep_their_layout_across_the_pass() {
        for attachment in attachment_descriptions() {
            assert_eq!(attachment.initial_layout, attachment.final_layout);
            assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        }
        let [color, depth] = attachment_descriptions();
        assert_eq!(color.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(depth.format, vk::Format::D32_SFLOAT_S8_UINT);
    }

    #[test]
    fn depth_clears_to_far_plane() {
        let values = clear_values([0.1, 0.1, 0.1, 1.0]);
        unsafe {
            assert_eq!(values[0].color.float32, [0.1, 0.1, 0.1, 1.0]);
            assert_eq!(values[1].depth_stencil.depth, 0.0);
        }
    }
}

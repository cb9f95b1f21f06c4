use std::sync::Arc;
use ash::vk;
use crate::renderer::core::device::RenderDevice;
use crate::renderer::error::{RenderError, RenderResult};
use crate::renderer::resources::buffer::bind_dedicated_memory;
use crate::renderer::resources::transition::{self, LayoutTransition};

pub const COLOR_ATTACHMENT_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
pub const DEPTH_ATTACHMENT_FORMAT: vk::Format = vk::Format::D32_SFLOAT_S8_UINT;
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

pub struct ImageCreateInfo {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
}

/// 2D image with its own memory, a default view and the layout it was last transitioned to
pub struct ImageResource {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub aspect: vk::ImageAspectFlags,
    layout: vk::ImageLayout,

    memory: vk::DeviceMemory,
    device: Arc<ash::Device>,
}

impl ImageResource {
    // The returned image is in UNDEFINED layout and holds no data yet
    fn new(create_info: &ImageCreateInfo, device: &RenderDevice) -> RenderResult<Self> {
        let logical = device.logical.clone();
        let extent = vk::Extent3D {
            width: create_info.extent.width,
            height: create_info.extent.height,
            depth: 1,
        };

        let image = {
            let info = vk::ImageCreateInfo::default()
                .format(create_info.format)
                .usage(create_info.usage)
                .extent(extent)
                .image_type(vk::ImageType::TYPE_2D)
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);
            unsafe { logical.create_image(&info, None) }.map_err(|e| {
                RenderError::ResourceAllocationFailure(format!("vkCreateImage failed: {}", e))
            })?
        };

        let reqs = unsafe { logical.get_image_memory_requirements(image) };
        let bound = bind_dedicated_memory(
            device,
            reqs,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            |memory| unsafe { logical.bind_image_memory(image, memory, 0) },
        );
        let memory = match bound {
            Ok((memory, _)) => memory,
            Err(e) => {
                unsafe { logical.destroy_image(image, None) };
                return Err(e);
            }
        };

        let view = {
            let info = vk::ImageViewCreateInfo::default()
                .view_type(vk::ImageViewType::TYPE_2D)
                .image(image)
                .format(create_info.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(transition::full_subresource_range(create_info.aspect));
            match unsafe { logical.create_image_view(&info, None) } {
                Ok(view) => view,
                Err(e) => {
                    unsafe {
                        logical.destroy_image(image, None);
                        logical.free_memory(memory, None);
                    }
                    return Err(e.into());
                }
            }
        };

        Ok(Self {
            image,
            view,
            format: create_info.format,
            extent,
            aspect: create_info.aspect,
            layout: vk::ImageLayout::UNDEFINED,
            memory,
            device: logical,
        })
    }

    /// Offscreen color target, blitted to the swapchain at the end of each frame
    pub fn new_color_attachment(device: &RenderDevice, extent: vk::Extent2D) -> RenderResult<Self> {
        Self::new(
            &ImageCreateInfo {
                format: COLOR_ATTACHMENT_FORMAT,
                extent,
                usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
                aspect: vk::ImageAspectFlags::COLOR,
            },
            device,
        )
    }

    pub fn new_depth_attachment(device: &RenderDevice, extent: vk::Extent2D) -> RenderResult<Self> {
        Self::new(
            &ImageCreateInfo {
                format: DEPTH_ATTACHMENT_FORMAT,
                extent,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                aspect: vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
            },
            device,
        )
    }

    /// Sampled RGBA8 image, filled through a staging buffer copy
    pub fn new_texture(device: &RenderDevice, width: u32, height: u32) -> RenderResult<Self> {
        Self::new(
            &ImageCreateInfo {
                format: TEXTURE_FORMAT,
                extent: vk::Extent2D { width, height },
                usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
                aspect: vk::ImageAspectFlags::COLOR,
            },
            device,
        )
    }

    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    pub fn transition(
        &mut self,
        cmd: vk::CommandBuffer,
        new_layout: vk::ImageLayout,
    ) -> RenderResult<LayoutTransition> {
        transition::record_transition(
            &self.device,
            cmd,
            self.image,
            self.aspect,
            &mut self.layout,
            new_layout,
        )
    }

    /// Linear blit of the whole image onto `dst`, which must be in TRANSFER_DST layout
    pub fn blit_to(&self, cmd: vk::CommandBuffer, dst: vk::Image, dst_extent: vk::Extent2D) {
        blit_image(
            &self.device,
            cmd,
            self.image,
            self.extent_2d(),
            dst,
            dst_extent,
        );
    }
}

impl Drop for ImageResource {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

fn blit_image(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    src: vk::Image,
    src_size: vk::Extent2D,
    dst: vk::Image,
    dst_size: vk::Extent2D,
) {
    let color_layer = vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    };
    let blit_region = vk::ImageBlit {
        src_subresource: color_layer,
        src_offsets: [
            vk::Offset3D { x: 0, y: 0, z: 0 },
            vk::Offset3D {
                x: src_size.width as i32,
                y: src_size.height as i32,
                z: 1,
            },
        ],
        dst_subresource: color_layer,
        dst_offsets: [
            vk::Offset3D { x: 0, y: 0, z: 0 },
            vk::Offset3D {
                x: dst_size.width as i32,
                y: dst_size.height as i32,
                z: 1,
            },
        ],
    };

    unsafe {
        device.cmd_blit_image(
            cmd,
            src,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            dst,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[blit_region],
            vk::Filter::LINEAR,
        );
    }
}

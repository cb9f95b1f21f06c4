use std::cell::Cell;
use std::sync::Arc;
use ash::prelude::VkResult;
use ash::vk;
use winit::window::Window;

use crate::renderer::core::device::RenderDevice;
use crate::renderer::error::{RenderError, RenderResult};
use crate::renderer::resources::transition::{self, LayoutTransition};

const DESIRED_IMAGE_COUNT: u32 = 2;

/// Presentation target of the renderer, encapsulating the surface and swapchain
pub struct RenderTarget {
    pub surface_format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,

    swapchain: vk::SwapchainKHR,
    swapchain_loader: ash::khr::swapchain::Device,
    images: Vec<vk::Image>,
    image_layouts: Vec<vk::ImageLayout>,
    // One per presentable image, signaled by the frame's submit and waited on by its present
    render_finished: Vec<vk::Semaphore>,
    acquire_fence: vk::Fence,
    acquisition: Acquisition,
    present_queue: vk::Queue,

    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    device: Arc<ash::Device>,
}

impl RenderTarget {
    pub fn new(
        window: &Window,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        instance: &ash::Instance,
        device: &RenderDevice,
    ) -> RenderResult<Self> {
        let (capabilities, surface_format) =
            match Self::query_surface(&surface_loader, surface, device) {
                Ok(queried) => queried,
                Err(e) => {
                    unsafe { surface_loader.destroy_surface(surface, None) };
                    return Err(e);
                }
            };

        let window_size = window.inner_size();
        let extent = swapchain_extent(&capabilities, window_size.width, window_size.height);
        let min_image_count = requested_image_count(&capabilities);
        let pre_transform = if capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            capabilities.current_transform
        };

        log::info!(
            "Creating swapchain: {:?} {:?}, {}x{}, {} images",
            surface_format.format,
            surface_format.color_space,
            extent.width,
            extent.height,
            min_image_count,
        );

        let swapchain_loader = ash::khr::swapchain::Device::new(instance, &device.logical);
        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_usage(
                vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::COLOR_ATTACHMENT
            )
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true)
            .image_array_layers(1);

        let swapchain = match unsafe { swapchain_loader.create_swapchain(&swapchain_info, None) } {
            Ok(swapchain) => swapchain,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(RenderError::InitializationFailure(format!(
                    "vkCreateSwapchainKHR failed: {}",
                    e
                )));
            }
        };

        // From here on Drop cleans up whatever has been created
        let mut target = Self {
            surface_format,
            extent,
            swapchain,
            swapchain_loader,
            images: Vec::new(),
            image_layouts: Vec::new(),
            render_finished: Vec::new(),
            acquire_fence: vk::Fence::null(),
            acquisition: Acquisition::default(),
            present_queue: device.graphics_queue.handle,
            surface,
            surface_loader,
            device: device.logical.clone(),
        };

        target.images = unsafe { target.swapchain_loader.get_swapchain_images(swapchain)? };
        target.image_layouts = vec![vk::ImageLayout::UNDEFINED; target.images.len()];
        for _ in 0..target.images.len() {
            let semaphore = unsafe {
                target
                    .device
                    .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
            };
            target.render_finished.push(semaphore);
        }
        target.acquire_fence = unsafe {
            target
                .device
                .create_fence(&vk::FenceCreateInfo::default(), None)?
        };

        Ok(target)
    }

    /// Checks that the graphics queue can present and picks the first reported format
    fn query_surface(
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        device: &RenderDevice,
    ) -> RenderResult<(vk::SurfaceCapabilitiesKHR, vk::SurfaceFormatKHR)> {
        let physical_device = device.physical;
        let family = device.graphics_queue.family.index;

        let present_supported = unsafe {
            surface_loader.get_physical_device_surface_support(physical_device, family, surface)?
        };
        if !present_supported {
            return Err(RenderError::InitializationFailure(format!(
                "queue family {} cannot present to the window surface",
                family
            )));
        }

        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let surface_format = formats.first().copied().ok_or_else(|| {
            RenderError::InitializationFailure("surface reports no formats".into())
        })?;

        Ok((capabilities, surface_format))
    }

    pub fn image(&self, index: u32) -> vk::Image {
        self.images[index as usize]
    }

    pub fn image_layout(&self, index: u32) -> vk::ImageLayout {
        self.image_layouts[index as usize]
    }

    /// Puts back a layout recorded into a command buffer that was never submitted
    pub fn restore_layout(&mut self, index: u32, layout: vk::ImageLayout) {
        self.image_layouts[index as usize] = layout;
    }

    pub fn render_finished(&self, index: u32) -> vk::Semaphore {
        self.render_finished[index as usize]
    }

    pub fn transition_image(
        &mut self,
        cmd: vk::CommandBuffer,
        index: u32,
        to: vk::ImageLayout,
    ) -> RenderResult<LayoutTransition> {
        let image = self.images[index as usize];
        transition::record_transition(
            &self.device,
            cmd,
            image,
            vk::ImageAspectFlags::COLOR,
            &mut self.image_layouts[index as usize],
            to,
        )
    }

    /// Acquires the next presentable image and blocks on the acquisition fence until it is
    /// actually available, so the frame's submit needs no wait semaphore.
    ///
    /// An out of date swapchain is reported as a [`RenderError::SubmissionFailure`]. If the
    /// fence wait times out, the image stays acquired and the next call returns it once the
    /// fence signals.
    pub fn acquire_next(&self, timeout_ns: u64) -> RenderResult<u32> {
        self.acquisition.next(self, timeout_ns)
    }

    /// Queues `index` for presentation once its render finished semaphore is signaled
    pub fn present(&self, index: u32) -> RenderResult<()> {
        let wait_semaphores = [self.render_finished(index)];
        let swapchains = [self.swapchain];
        let image_indices = [index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_loader.queue_present(self.present_queue, &present_info) } {
            Ok(false) => Ok(()),
            Ok(true) => {
                log::warn!("Presented to a suboptimal swapchain");
                Ok(())
            }
            Err(e) => Err(RenderError::SubmissionFailure(e)),
        }
    }
}

impl AcquireOps for RenderTarget {
    fn reset_fence(&self) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[self.acquire_fence]) }
    }

    fn acquire(&self, timeout_ns: u64) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout_ns,
                vk::Semaphore::null(),
                self.acquire_fence,
            )
        }
    }

    fn wait_fence(&self, timeout_ns: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[self.acquire_fence], true, timeout_ns) }
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        unsafe {
            if self.acquire_fence != vk::Fence::null() {
                self.device.destroy_fence(self.acquire_fence, None);
            }
            for semaphore in self.render_finished.drain(..) {
                self.device.destroy_semaphore(semaphore, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

/// Swapchain calls behind fence-gated acquisition
trait AcquireOps {
    fn reset_fence(&self) -> VkResult<()>;
    /// Returns the image index and whether the swapchain is suboptimal
    fn acquire(&self, timeout_ns: u64) -> VkResult<(u32, bool)>;
    fn wait_fence(&self, timeout_ns: u64) -> VkResult<()>;
}

/// Tracks an image that was acquired but whose fence has not been seen signaled.
///
/// The fence is only reset when no such image is pending, so a reset never hits a fence the
/// presentation engine may still signal.
#[derive(Debug, Default)]
struct Acquisition {
    pending: Cell<Option<u32>>,
}

impl Acquisition {
    fn next<O: AcquireOps>(&self, ops: &O, timeout_ns: u64) -> RenderResult<u32> {
        let index = match self.pending.take() {
            Some(index) => index,
            None => {
                ops.reset_fence()?;
                match ops.acquire(timeout_ns) {
                    Ok((index, false)) => index,
                    Ok((index, true)) => {
                        log::warn!(
                            "Swapchain is suboptimal for the surface, recreation is not supported"
                        );
                        index
                    }
                    Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => {
                        return Err(RenderError::SynchronizationTimeout {
                            what: "swapchain image acquisition",
                        });
                    }
                    Err(e @ vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                        return Err(RenderError::SubmissionFailure(e));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        match ops.wait_fence(timeout_ns) {
            Ok(()) => Ok(index),
            Err(vk::Result::TIMEOUT) => {
                self.pending.set(Some(index));
                Err(RenderError::SynchronizationTimeout {
                    what: "swapchain acquisition fence",
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// The surface's current extent, or the window size clamped to the surface limits when the
/// surface leaves it to the swapchain
pub fn swapchain_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_width: u32,
    window_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: window_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: window_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// Double buffering, within what the surface allows. A `max_image_count` of 0 means no limit.
pub fn requested_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = DESIRED_IMAGE_COUNT.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn capabilities(current: (u32, u32), min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: 16, height: 16 },
            max_image_extent: vk::Extent2D { width: 4096, height: 2048 },
            min_image_count: min_count,
            max_image_count: max_count,
            ..Default::default()
        }
    }

    /// Swapchain stand-in handing out images in order. The fence needs `fence_waits` more
    /// waits before it reports signaled.
    #[derive(Default)]
    struct FakeSwapchain {
        next_image: Cell<u32>,
        fence_waits: Cell<u32>,
        fence_signaled: Cell<bool>,
        calls: RefCell<Vec<&'static str>>,
    }

    impl AcquireOps for FakeSwapchain {
        fn reset_fence(&self) -> VkResult<()> {
            assert!(self.fence_signaled.get(), "reset of a fence with pending work");
            self.fence_signaled.set(false);
            self.calls.borrow_mut().push("reset");
            Ok(())
        }

        fn acquire(&self, _timeout_ns: u64) -> VkResult<(u32, bool)> {
            self.calls.borrow_mut().push("acquire");
            let index = self.next_image.get();
            self.next_image.set(index + 1);
            Ok((index, false))
        }

        fn wait_fence(&self, _timeout_ns: u64) -> VkResult<()> {
            self.calls.borrow_mut().push("wait");
            match self.fence_waits.get() {
                0 => {
                    self.fence_signaled.set(true);
                    Ok(())
                }
                left => {
                    self.fence_waits.set(left - 1);
                    Err(vk::Result::TIMEOUT)
                }
            }
        }
    }

    fn fake_swapchain(fence_waits: u32) -> FakeSwapchain {
        let swapchain = FakeSwapchain::default();
        swapchain.fence_waits.set(fence_waits);
        swapchain.fence_signaled.set(true);
        swapchain
    }

    #[test]
    fn acquires_in_order() {
        let swapchain = fake_swapchain(0);
        let acquisition = Acquisition::default();
        assert_eq!(acquisition.next(&swapchain, 10).unwrap(), 0);
        assert_eq!(acquisition.next(&swapchain, 10).unwrap(), 1);
        assert_eq!(*swapchain.calls.borrow(), ["reset", "acquire", "wait"].repeat(2));
    }

    #[test]
    fn timed_out_image_is_returned_by_the_next_call() {
        let swapchain = fake_swapchain(2);
        let acquisition = Acquisition::default();

        for _ in 0..2 {
            assert!(matches!(
                acquisition.next(&swapchain, 10),
                Err(RenderError::SynchronizationTimeout { .. })
            ));
        }
        assert_eq!(acquisition.next(&swapchain, 10).unwrap(), 0);
        assert_eq!(
            *swapchain.calls.borrow(),
            ["reset", "acquire", "wait", "wait", "wait"]
        );

        // Only once the pending image is handed out does a new acquisition start
        assert_eq!(acquisition.next(&swapchain, 10).unwrap(), 1);
        assert_eq!(swapchain.next_image.get(), 2);
    }

    #[test]
    fn uses_surface_extent_when_fixed() {
        let caps = capabilities((800, 600), 2, 8);
        assert_eq!(swapchain_extent(&caps, 1024, 768), vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn clamps_window_size_when_surface_defers() {
        let caps = capabilities((u32::MAX, u32::MAX), 2, 8);
        assert_eq!(swapchain_extent(&caps, 1024, 768), vk::Extent2D { width: 1024, height: 768 });
        assert_eq!(swapchain_extent(&caps, 8, 9000), vk::Extent2D { width: 16, height: 2048 });
    }

    #[test]
    fn image_count_respects_surface_limits() {
        assert_eq!(requested_image_count(&capabilities((1, 1), 1, 8)), 2);
        assert_eq!(requested_image_count(&capabilities((1, 1), 3, 8)), 3);
        assert_eq!(requested_image_count(&capabilities((1, 1), 1, 1)), 1);
        assert_eq!(requested_image_count(&capabilities((1, 1), 2, 0)), 2);
    }
}

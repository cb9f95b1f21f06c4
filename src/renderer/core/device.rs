use std::ffi::{c_char, CStr};
use std::sync::Arc;
use ash::vk;
use crate::renderer::core::queue::{Queue, QueueFamily};
use crate::renderer::error::{RenderError, RenderResult};
use crate::renderer::memory::MemoryCapabilities;

/// Logical device, its single graphics queue and the command pool every command buffer comes from
pub struct RenderDevice {
    pub logical: Arc<ash::Device>,
    pub physical: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub graphics_queue: Queue,
    pub memory: MemoryCapabilities,
    command_pool: vk::CommandPool,
}

impl RenderDevice {
    pub fn new(instance: &ash::Instance) -> RenderResult<Self> {
        let (physical, graphics_family) = Self::select_physical_device(instance)?;
        let properties = unsafe { instance.get_physical_device_properties(physical) };
        log::info!(
            "Using {:?} ({:?}), graphics queue family {} with {} queues",
            properties.device_name_as_c_str().unwrap_or(c"<unnamed>"),
            properties.device_type,
            graphics_family.index,
            graphics_family.properties.queue_count,
        );

        let logical = Self::create_logical_device(instance, physical, &properties, graphics_family)?;
        let graphics_queue = unsafe {
            let queue = logical.get_device_queue(graphics_family.index, 0);
            Queue::new(graphics_family, queue)
        };
        let memory = MemoryCapabilities::query(instance, physical);

        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(graphics_family.index)
            // Allow the pool to reset individual command buffers
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { logical.create_command_pool(&command_pool_info, None) }
            .map_err(|e| {
                unsafe { logical.destroy_device(None) };
                RenderError::InitializationFailure(format!("command pool creation failed: {}", e))
            })?;

        Ok(Self {
            logical: Arc::new(logical),
            physical,
            properties,
            graphics_queue,
            memory,
            command_pool,
        })
    }

    pub fn allocate_command_buffers(&self, count: u32) -> RenderResult<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .command_buffer_count(count)
            .level(vk::CommandBufferLevel::PRIMARY);
        Ok(unsafe { self.logical.allocate_command_buffers(&info)? })
    }

    /// Largest sampled image array the fragment stage can bind
    pub fn max_sampled_images(&self) -> usize {
        self.properties.limits.max_per_stage_descriptor_sampled_images as usize
    }

    pub fn wait_idle(&self) -> RenderResult<()> {
        unsafe { self.logical.device_wait_idle()? };
        Ok(())
    }

    /// The first adapter, in enumeration order, with a graphics-capable queue family
    fn select_physical_device(
        instance: &ash::Instance,
    ) -> RenderResult<(vk::PhysicalDevice, QueueFamily)> {
        let devices = unsafe { instance.enumerate_physical_devices()? };
        devices
            .into_iter()
            .find_map(|device| {
                let props = unsafe { instance.get_physical_device_queue_family_properties(device) };
                QueueFamily::find_graphics(&props).map(|family| (device, family))
            })
            .ok_or_else(|| {
                RenderError::InitializationFailure("no adapter with a graphics queue".into())
            })
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical: vk::PhysicalDevice,
        properties: &vk::PhysicalDeviceProperties,
        graphics_family: QueueFamily,
    ) -> RenderResult<ash::Device> {
        if properties.api_version < vk::API_VERSION_1_2 {
            return Err(RenderError::InitializationFailure(format!(
                "adapter supports Vulkan {}.{}, 1.2 is required",
                vk::api_version_major(properties.api_version),
                vk::api_version_minor(properties.api_version),
            )));
        }

        let queue_priorities = [1.0];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(graphics_family.index)
            .queue_priorities(&queue_priorities)];

        let enabled_extension_names = Self::get_required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();

        // Enable everything the adapter reports, the texture array needs runtimeDescriptorArray
        // and descriptorBindingVariableDescriptorCount
        let mut vulkan12_features = vk::PhysicalDeviceVulkan12Features::default();
        let core_features = {
            let mut features = vk::PhysicalDeviceFeatures2::default()
                .push_next(&mut vulkan12_features);
            unsafe { instance.get_physical_device_features2(physical, &mut features) };
            features.features
        };
        if vulkan12_features.runtime_descriptor_array != vk::TRUE {
            return Err(RenderError::InitializationFailure(
                "adapter does not support runtime descriptor arrays".into(),
            ));
        }
        if vulkan12_features.descriptor_binding_variable_descriptor_count != vk::TRUE {
            return Err(RenderError::InitializationFailure(
                "adapter does not support variable descriptor counts".into(),
            ));
        }
        let mut features = vk::PhysicalDeviceFeatures2::default()
            .features(core_features)
            .push_next(&mut vulkan12_features);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .push_next(&mut features);

        unsafe { instance.create_device(physical, &device_create_info, None) }.map_err(|e| {
            RenderError::InitializationFailure(format!("vkCreateDevice failed: {}", e))
        })
    }

    fn get_required_device_extensions() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,

            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.logical.device_wait_idle() {
                log::error!("Device did not go idle before teardown: {}", e);
            }
            self.logical.destroy_command_pool(self.command_pool, None);
            self.logical.destroy_device(None);
        }
    }
}

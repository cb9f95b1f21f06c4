use std::sync::Arc;
use ash::vk;
use crate::renderer::error::{RenderError, RenderResult};

pub const SAMPLER_BINDING: u32 = 0;
pub const UNIFORM_BINDING: u32 = 1;
/// Variable-count bindings must use the highest binding number of their set
pub const TEXTURES_BINDING: u32 = 2;

pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
    binding_flags: Vec<vk::DescriptorBindingFlags>,
}

impl DescriptorSetLayoutBuilder {
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
            binding_flags: Vec::new(),
        }
    }

    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        descriptor_count: u32,
        stages: vk::ShaderStageFlags,
        binding_flags: vk::DescriptorBindingFlags,
    ) -> Self {
        let binding = vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(descriptor_type)
            .descriptor_count(descriptor_count)
            .stage_flags(stages);

        self.bindings.push(binding);
        self.binding_flags.push(binding_flags);
        self
    }

    /// Descriptor count of the binding flagged `VARIABLE_DESCRIPTOR_COUNT`, if any
    pub fn variable_descriptor_count(&self) -> Option<u32> {
        self.bindings
            .iter()
            .zip(&self.binding_flags)
            .find(|(_, flags)| flags.contains(vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT))
            .map(|(binding, _)| binding.descriptor_count)
    }

    /// Pool sizes that hold exactly `sets` copies of this layout
    pub fn pool_sizes(&self, sets: u32) -> Vec<vk::DescriptorPoolSize> {
        let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
        for binding in &self.bindings {
            let count = binding.descriptor_count * sets;
            match sizes.iter_mut().find(|s| s.ty == binding.descriptor_type) {
                Some(size) => size.descriptor_count += count,
                None => sizes.push(vk::DescriptorPoolSize {
                    ty: binding.descriptor_type,
                    descriptor_count: count,
                }),
            }
        }
        sizes
    }

    pub fn build(&self, device: &ash::Device) -> RenderResult<vk::DescriptorSetLayout> {
        let mut binding_flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::default()
            .binding_flags(&self.binding_flags);

        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&self.bindings)
            .push_next(&mut binding_flags_info);

        Ok(unsafe { device.create_descriptor_set_layout(&layout_info, None)? })
    }
}

impl Default for DescriptorSetLayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Bindings of the single descriptor set: sampler, the per-frame matrices and a
/// variable-count texture array sized to `texture_count`
pub fn scene_layout(texture_count: u32) -> DescriptorSetLayoutBuilder {
    DescriptorSetLayoutBuilder::new()
        .add_binding(
            SAMPLER_BINDING,
            vk::DescriptorType::SAMPLER,
            1,
            vk::ShaderStageFlags::FRAGMENT,
            vk::DescriptorBindingFlags::empty(),
        )
        .add_binding(
            UNIFORM_BINDING,
            vk::DescriptorType::UNIFORM_BUFFER,
            1,
            vk::ShaderStageFlags::VERTEX,
            vk::DescriptorBindingFlags::empty(),
        )
        .add_binding(
            TEXTURES_BINDING,
            vk::DescriptorType::SAMPLED_IMAGE,
            texture_count.max(1),
            vk::ShaderStageFlags::FRAGMENT,
            vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT,
        )
}

/// The one descriptor set used for the whole render, with its layout and pool
pub struct SceneDescriptors {
    pub layout: vk::DescriptorSetLayout,
    pub set: vk::DescriptorSet,
    pool: vk::DescriptorPool,
    device: Arc<ash::Device>,
}

impl SceneDescriptors {
    pub fn new(device: Arc<ash::Device>, texture_count: u32) -> RenderResult<Self> {
        let builder = scene_layout(texture_count);
        let layout = builder.build(&device)?;

        let pool_sizes = builder.pool_sizes(1);
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(1)
            .pool_sizes(&pool_sizes);
        let pool = match unsafe { device.create_descriptor_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_descriptor_set_layout(layout, None) };
                return Err(e.into());
            }
        };

        let mut descriptors = Self {
            layout,
            set: vk::DescriptorSet::null(),
            pool,
            device,
        };

        let set_layouts = [layout];
        let variable_counts = [builder.variable_descriptor_count().unwrap_or(0)];
        let mut variable_count_info = vk::DescriptorSetVariableDescriptorCountAllocateInfo::default()
            .descriptor_counts(&variable_counts);
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&set_layouts)
            .push_next(&mut variable_count_info);
        descriptors.set = unsafe { descriptors.device.allocate_descriptor_sets(&allocate_info) }
            .map_err(|e| {
                RenderError::ResourceAllocationFailure(format!("descriptor set: {}", e))
            })?
            .into_iter()
            .next()
            .ok_or_else(|| RenderError::ResourceAllocationFailure("no descriptor set".into()))?;

        Ok(descriptors)
    }

    pub fn write_batch(&self) -> DescriptorWriteBatch {
        DescriptorWriteBatch::new(self.set)
    }
}

impl Drop for SceneDescriptors {
    fn drop(&mut self) {
        unsafe {
            // Sets are returned with the pool
            self.device.destroy_descriptor_pool(self.pool, None);
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor writes collected up front and applied in one update call
pub struct DescriptorWriteBatch {
    set: vk::DescriptorSet,
    samplers: Vec<(u32, vk::DescriptorImageInfo)>,
    images: Vec<(u32, Vec<vk::DescriptorImageInfo>)>,
    uniform_buffers: Vec<(u32, vk::DescriptorBufferInfo)>,
}

impl DescriptorWriteBatch {
    pub fn new(set: vk::DescriptorSet) -> Self {
        Self {
            set,
            samplers: Vec::new(),
            images: Vec::new(),
            uniform_buffers: Vec::new(),
        }
    }

    pub fn sampler(mut self, binding: u32, sampler: vk::Sampler) -> Self {
        self.samplers.push((binding, vk::DescriptorImageInfo::default().sampler(sampler)));
        self
    }

    pub fn sampled_images(mut self, binding: u32, views: &[vk::ImageView]) -> Self {
        let infos = views
            .iter()
            .map(|view| {
                vk::DescriptorImageInfo::default()
                    .image_view(*view)
                    .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            })
            .collect();
        self.images.push((binding, infos));
        self
    }

    pub fn uniform_buffer(mut self, binding: u32, buffer: vk::Buffer, range: vk::DeviceSize) -> Self {
        self.uniform_buffers.push((
            binding,
            vk::DescriptorBufferInfo {
                buffer,
                offset: 0,
                range,
            },
        ));
        self
    }

    pub fn writes(&self) -> Vec<vk::WriteDescriptorSet<'_>> {
        let samplers = self.samplers.iter().map(|(binding, info)| {
            vk::WriteDescriptorSet::default()
                .dst_set(self.set)
                .dst_binding(*binding)
                .descriptor_type(vk::DescriptorType::SAMPLER)
                .image_info(std::slice::from_ref(info))
        });
        let images = self
            .images
            .iter()
            .filter(|(_, infos)| !infos.is_empty())
            .map(|(binding, infos)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(self.set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                    .image_info(infos)
            });
        let buffers = self.uniform_buffers.iter().map(|(binding, info)| {
            vk::WriteDescriptorSet::default()
                .dst_set(self.set)
                .dst_binding(*binding)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(std::slice::from_ref(info))
        });

        samplers.chain(images).chain(buffers).collect()
    }

    pub fn flush(self, device: &ash::Device) {
        let writes = self.writes();
        log::debug!("Updating {} descriptor bindings", writes.len());
        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }
    }
}

/// Linear filtering with repeat addressing, as used for every model texture
pub fn create_texture_sampler(device: &ash::Device) -> RenderResult<vk::Sampler> {
    let info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(false)
        .compare_enable(false)
        .min_lod(0.0)
        .max_lod(0.25)
        .border_color(vk::BorderColor::INT_OPAQUE_WHITE);
    Ok(unsafe { device.create_sampler(&info, None)? })
}

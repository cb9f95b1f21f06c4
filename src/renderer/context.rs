use std::mem::size_of;
use std::path::Path;
use ash::vk;
use winit::window::Window;

use crate::renderer::config::{RenderConfig, FRAMES_IN_FLIGHT};
use crate::renderer::core::device::RenderDevice;
use crate::renderer::core::frame::{DeviceFence, FrameRing, FrameSlot};
use crate::renderer::core::instance::RenderInstance;
use crate::renderer::core::render_pass::OffscreenTarget;
use crate::renderer::core::target::RenderTarget;
use crate::renderer::core::transfer::TransferContext;
use crate::renderer::descriptor::{self, SceneDescriptors};
use crate::renderer::draw::{self, SceneResources, PUSH_CONSTANT_STAGES};
use crate::renderer::error::{RenderError, RenderResult};
use crate::renderer::resources::buffer::BufferResource;
use crate::renderer::resources::material::MaterialTable;
use crate::renderer::resources::mesh::Mesh;
use crate::renderer::resources::pipeline::{self, GraphicsPipelineBuilder};
use crate::renderer::resources::shader::GraphicsShader;
use crate::renderer::resources::texture::{self, Texture, TextureArray, TexturePixels};
use crate::renderer::resources::vertex::VertexInputDescription;
use crate::renderer::shader_data::{PerFrameData, PerVertexData, PushConstants, SceneProperties};

/// Outcome of [`GraphicsContext::render_frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented { image_index: u32 },
    /// Nothing was presented this frame, the reason has been logged
    Dropped,
}

/// Owns every GPU object of the viewer.
///
/// Fields are dropped top to bottom, which is the reverse of creation order.
pub struct GraphicsContext {
    frames: FrameRing<DeviceFence>,
    scene: Option<SceneResources>,
    sampler: vk::Sampler,
    textures: TextureArray<Texture>,
    uniform_buffer: BufferResource,
    offscreen: OffscreenTarget,
    transfer: TransferContext,
    target: RenderTarget,
    device: RenderDevice,
    #[allow(dead_code)]
    instance: RenderInstance,

    config: RenderConfig,
}

impl GraphicsContext {
    pub fn new(window: &Window, config: RenderConfig) -> RenderResult<Self> {
        let instance = RenderInstance::new(window, config.enable_validation)?;
        let (surface, surface_loader) = instance.create_surface(window)?;

        let device = match RenderDevice::new(&instance.instance) {
            Ok(device) => device,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };
        let target = RenderTarget::new(window, surface, surface_loader, &instance.instance, &device)?;
        let transfer = TransferContext::new(&device)?;

        let mut offscreen = OffscreenTarget::new(&device, config.window_extent)?;
        transfer.immediate_submit(|cmd, _| offscreen.prepare_attachments(cmd))?;

        let uniform_buffer = BufferResource::new(
            &device,
            size_of::<PerFrameData>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::SharingMode::EXCLUSIVE,
        )?;

        let capacity = device.max_sampled_images().min(config.max_textures).max(1);
        let mut textures = TextureArray::new(capacity);
        textures.push(Texture::upload(&device, &transfer, &TexturePixels::white())?)?;
        log::debug!("Texture array holds up to {} textures", capacity);

        let sampler = descriptor::create_texture_sampler(&device.logical)?;

        let command_buffers = device.allocate_command_buffers(FRAMES_IN_FLIGHT as u32)?;
        let mut slots = Vec::with_capacity(FRAMES_IN_FLIGHT);
        for command_buffer in command_buffers {
            let fence = DeviceFence::new_signaled(device.logical.clone())?;
            slots.push(FrameSlot::new(fence, command_buffer));
        }
        let frames = FrameRing::new(slots, config.fence_timeout_ns);

        Ok(Self {
            frames,
            scene: None,
            sampler,
            textures,
            uniform_buffer,
            offscreen,
            transfer,
            target,
            device,
            instance,
            config,
        })
    }

    /// Uploads the diffuse maps of `materials`, resolving their paths against `base_dir`,
    /// and stores the resulting texture slot in each material
    pub fn upload_textures(&mut self, materials: &mut MaterialTable, base_dir: &Path) -> usize {
        let device = &self.device;
        let transfer = &self.transfer;
        let added = texture::assign_texture_slots(materials, base_dir, &mut self.textures, |path| {
            let pixels = TexturePixels::load(path)?;
            Ok(Texture::upload(device, transfer, &pixels)?)
        });
        log::info!(
            "Uploaded {} textures ({} slots in use of {})",
            added,
            self.textures.len(),
            self.textures.capacity(),
        );
        added
    }

    /// Creates the vertex buffer, descriptor set and pipeline for `mesh`. Textures must be
    /// uploaded first, the descriptor set is sized to the textures present now.
    pub fn build_static_resources(
        &mut self,
        mesh: &Mesh,
        materials: &MaterialTable,
    ) -> RenderResult<()> {
        if self.scene.is_some() {
            self.device.wait_idle()?;
            self.scene = None;
        }
        let logical = self.device.logical.clone();

        let vertex_bytes = (mesh.vertices.len().max(1) * size_of::<PerVertexData>()) as vk::DeviceSize;
        let mut vertex_buffer = BufferResource::new(
            &self.device,
            vertex_bytes,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::SharingMode::EXCLUSIVE,
        )?;
        vertex_buffer.write(&mesh.vertices, 0)?;

        let descriptors = SceneDescriptors::new(logical.clone(), self.textures.len() as u32)?;
        descriptors
            .write_batch()
            .sampler(descriptor::SAMPLER_BINDING, self.sampler)
            .sampled_images(descriptor::TEXTURES_BINDING, &self.textures.views())
            .uniform_buffer(
                descriptor::UNIFORM_BINDING,
                self.uniform_buffer.buffer,
                self.uniform_buffer.size,
            )
            .flush(&logical);

        let shader = GraphicsShader::new(
            &self.config.shader_dir,
            &self.config.shader_name,
            logical.clone(),
        )?;
        let pipeline_layout = pipeline::create_pipeline_layout(
            &logical,
            descriptors.layout,
            PUSH_CONSTANT_STAGES,
            size_of::<PushConstants>() as u32,
        )?;
        let pipeline = GraphicsPipelineBuilder::new(logical)
            .with_shader(shader)
            .with_pipeline_layout(pipeline_layout)
            .with_render_pass(self.offscreen.render_pass)
            .with_extent(self.offscreen.extent())
            .with_input_topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .with_polygon_mode(vk::PolygonMode::FILL)
            .with_cull_mode(vk::CullModeFlags::NONE, vk::FrontFace::COUNTER_CLOCKWISE)
            .with_multisampling_disabled()
            .with_blending_disabled()
            .with_depth_test(true, Some(vk::CompareOp::GREATER))
            .with_vertex_input(VertexInputDescription::default())
            .build()?;

        let draws = draw::plan_draws(&mesh.runs, mesh.face_count);
        log::info!(
            "Scene ready: {} vertices, {} faces, {} draws",
            mesh.vertices.len(),
            mesh.face_count,
            draws.len(),
        );

        self.scene = Some(SceneResources {
            pipeline,
            descriptors,
            vertex_buffer,
            draws,
            materials: materials.property_snapshot(),
        });
        Ok(())
    }

    /// Records, submits and presents one frame using slot `frame_number % 2`.
    ///
    /// Acquisition timeouts and submit/present failures drop the frame instead of failing.
    pub fn render_frame(
        &mut self,
        frame_number: u64,
        frame_data: &PerFrameData,
        scene_properties: &SceneProperties,
    ) -> RenderResult<FrameStatus> {
        let Some(scene) = self.scene.as_ref() else {
            return Err(RenderError::InitializationFailure(
                "render_frame called before build_static_resources".into(),
            ));
        };

        let slot = self.frames.begin(frame_number)?;

        let image_index = match self.target.acquire_next(self.config.fence_timeout_ns) {
            Ok(index) => index,
            Err(e) if e.is_recoverable() => {
                log::warn!("Dropping frame {}: {}", frame_number, e);
                self.frames.abandon(&slot);
                return Ok(FrameStatus::Dropped);
            }
            Err(e) => {
                self.frames.abandon(&slot);
                return Err(e);
            }
        };

        // Shared by both slots, the previous frame may still be reading it
        let uniform_buffer = &mut self.uniform_buffer;
        self.frames.or_abandon(&slot, || {
            uniform_buffer.write(std::slice::from_ref(frame_data), 0)
        })?;

        let device = self.device.logical.clone();
        let cmd = slot.command_buffer;
        let presented_layout = self.target.image_layout(image_index);

        let recorded = (|| -> RenderResult<()> {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            unsafe {
                device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
                device.begin_command_buffer(cmd, &begin_info)?;
            }

            scene.record(&device, cmd, &self.offscreen, self.config.clear_color, scene_properties);
            draw::record_present_copy(cmd, &mut self.offscreen, &mut self.target, image_index)?;

            unsafe { device.end_command_buffer(cmd)? };
            Ok(())
        })();
        if let Err(e) = recorded {
            self.frames.abandon(&slot);
            self.target.restore_layout(image_index, presented_layout);
            return Err(e);
        }

        let queue = self.device.graphics_queue.handle;
        let signal = [self.target.render_finished(image_index)];
        let submitted = self.frames.submit(&slot, |cmd, fence| {
            let command_buffers = [cmd];
            let submit_info = vk::SubmitInfo::default()
                .command_buffers(&command_buffers)
                .signal_semaphores(&signal);
            unsafe { device.queue_submit(queue, &[submit_info], fence) }
                .map_err(RenderError::SubmissionFailure)
        });
        if let Err(e) = submitted {
            self.target.restore_layout(image_index, presented_layout);
            return match e {
                RenderError::SubmissionFailure(_) => {
                    log::error!("Dropping frame {}: {}", frame_number, e);
                    Ok(FrameStatus::Dropped)
                }
                e => Err(e),
            };
        }

        match self.target.present(image_index) {
            Ok(()) => Ok(FrameStatus::Presented { image_index }),
            Err(e @ RenderError::SubmissionFailure(_)) => {
                log::error!("Frame {} was not presented: {}", frame_number, e);
                Ok(FrameStatus::Dropped)
            }
            Err(e) => Err(e),
        }
    }
}

impl Drop for GraphicsContext {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle during teardown: {}", e);
        }
        unsafe {
            self.device.logical.destroy_sampler(self.sampler, None);
        }
    }
}

use std::sync::Arc;
use ash::vk;
use crate::renderer::core::device::RenderDevice;
use crate::renderer::error::{RenderError, RenderResult};

/// One-shot command buffer for setup work that runs outside the frame loop
pub struct TransferContext {
    command_buffer: vk::CommandBuffer,
    queue: vk::Queue,
    device: Arc<ash::Device>,
}

impl TransferContext {
    pub fn new(device: &RenderDevice) -> RenderResult<Self> {
        let command_buffer = device
            .allocate_command_buffers(1)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                RenderError::ResourceAllocationFailure("no transfer command buffer".into())
            })?;

        Ok(Self {
            command_buffer,
            queue: device.graphics_queue.handle,
            device: device.logical.clone(),
        })
    }

    /// Records `func`, submits it and blocks until the queue is idle.
    ///
    /// Used for texture uploads and the initial attachment layouts, never inside the frame loop.
    pub fn immediate_submit<F>(&self, func: F) -> RenderResult<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> RenderResult<()>,
    {
        let cmd = self.command_buffer;

        // This command buffer will be used exactly once before resetting
        let cmd_begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            self.device.begin_command_buffer(cmd, &cmd_begin_info)?;
        }

        let recorded = func(cmd, &self.device);

        // Always close the buffer so a failed recording leaves it resettable
        unsafe { self.device.end_command_buffer(cmd)? };
        recorded?;

        let cmds = [cmd];
        let submit = vk::SubmitInfo::default().command_buffers(&cmds);
        unsafe {
            self.device
                .queue_submit(self.queue, &[submit], vk::Fence::null())
                .map_err(RenderError::SubmissionFailure)?;
            self.device.queue_wait_idle(self.queue)?;
        }

        Ok(())
    }
}

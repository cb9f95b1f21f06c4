use ash::vk;
use crate::renderer::core::render_pass::OffscreenTarget;
use crate::renderer::core::target::RenderTarget;
use crate::renderer::descriptor::SceneDescriptors;
use crate::renderer::error::RenderResult;
use crate::renderer::resources::buffer::BufferResource;
use crate::renderer::resources::material::MaterialId;
use crate::renderer::resources::mesh::MaterialRun;
use crate::renderer::resources::pipeline::Pipeline;
use crate::renderer::shader_data::{MaterialProperties, PushConstants, SceneProperties};

pub const PUSH_CONSTANT_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::FRAGMENT;

/// One non-indexed draw covering a material run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub first_vertex: u32,
    pub vertex_count: u32,
    pub material: MaterialId,
}

/// Turns material runs into draw ranges over the de-indexed vertex buffer, three vertices
/// per face. Runs that cover no faces produce no draw.
pub fn plan_draws(runs: &[MaterialRun], face_count: u32) -> Vec<DrawCall> {
    runs.iter()
        .enumerate()
        .filter_map(|(i, run)| {
            let end = runs.get(i + 1).map_or(face_count, |next| next.start_face);
            let faces = end.saturating_sub(run.start_face);
            (faces > 0).then(|| DrawCall {
                first_vertex: run.start_face * 3,
                vertex_count: faces * 3,
                material: run.material,
            })
        })
        .collect()
}

/// Everything bound while the scene is drawn. Built once after the mesh is loaded.
pub struct SceneResources {
    pub pipeline: Pipeline,
    pub descriptors: SceneDescriptors,
    pub vertex_buffer: BufferResource,
    pub draws: Vec<DrawCall>,
    // Snapshot of the material table, indexed by MaterialId
    pub materials: Vec<MaterialProperties>,
}

impl SceneResources {
    fn material(&self, id: MaterialId) -> MaterialProperties {
        self.materials.get(id.index()).copied().unwrap_or_default()
    }

    /// Records the render pass drawing every material run into the offscreen attachments
    pub fn record(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        offscreen: &OffscreenTarget,
        clear_color: [f32; 4],
        scene: &SceneProperties,
    ) {
        offscreen.begin(cmd, clear_color);

        unsafe {
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
        }
        self.pipeline.bind_pipeline(cmd);
        self.pipeline.bind_descriptor_sets(cmd, 0, &[self.descriptors.set]);

        for draw in &self.draws {
            let push_constants = PushConstants {
                material: self.material(draw.material),
                scene: *scene,
            };
            self.pipeline.update_push_constants(
                cmd,
                PUSH_CONSTANT_STAGES,
                bytemuck::bytes_of(&push_constants),
            );
            unsafe {
                device.cmd_draw(cmd, draw.vertex_count, 1, draw.first_vertex, 0);
            }
        }

        offscreen.end(cmd);
    }
}

/// Blits the finished color attachment onto swapchain image `index` and leaves that image
/// ready for presentation
pub fn record_present_copy(
    cmd: vk::CommandBuffer,
    offscreen: &mut OffscreenTarget,
    target: &mut RenderTarget,
    index: u32,
) -> RenderResult<()> {
    offscreen.color.transition(cmd, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)?;
    // UNDEFINED on the image's first use, PRESENT_SRC afterwards
    target.transition_image(cmd, index, vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;

    offscreen.color.blit_to(cmd, target.image(index), target.extent);

    offscreen.color.transition(cmd, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)?;
    target.transition_image(cmd, index, vk::ImageLayout::PRESENT_SRC_KHR)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::resources::material::{Material, MaterialTable};
    use crate::renderer::resources::mesh::runs_from_spans;

    fn ids(count: usize) -> Vec<MaterialId> {
        let mut table = MaterialTable::new();
        (0..count)
            .map(|i| table.insert(Material::new(format!("m{}", i))))
            .collect()
    }

    fn summary(draws: &[DrawCall]) -> Vec<(u32, u32)> {
        draws.iter().map(|d| (d.first_vertex, d.vertex_count)).collect()
    }

    #[test]
    fn two_runs() {
        let m = ids(2);
        let runs = vec![
            MaterialRun { start_face: 0, material: m[0] },
            MaterialRun { start_face: 10, material: m[1] },
        ];
        let draws = plan_draws(&runs, 20);
        assert_eq!(summary(&draws), vec![(0, 30), (30, 30)]);
        assert_eq!(draws[1].material, m[1]);
    }

    #[test]
    fn single_run() {
        let m = ids(1);
        let runs = vec![MaterialRun { start_face: 0, material: m[0] }];
        assert_eq!(summary(&plan_draws(&runs, 5)), vec![(0, 15)]);
    }

    #[test]
    fn empty_mesh_draws_nothing() {
        assert!(plan_draws(&[], 0).is_empty());
        let m = ids(1);
        let runs = vec![MaterialRun { start_face: 0, material: m[0] }];
        assert!(plan_draws(&runs, 0).is_empty());
    }

    #[test]
    fn draws_cover_every_vertex_exactly_once() {
        let m = ids(3);
        let layouts: [&[u32]; 4] = [&[4], &[1, 1, 1], &[7, 2, 9, 3], &[1, 20, 1]];
        for sizes in layouts {
            let spans: Vec<_> = sizes
                .iter()
                .enumerate()
                .map(|(i, &size)| (size, m[i % m.len()]))
                .collect();
            let face_count: u32 = sizes.iter().sum();
            let draws = plan_draws(&runs_from_spans(&spans), face_count);

            let mut next = 0;
            for draw in &draws {
                assert_eq!(draw.first_vertex, next);
                assert!(draw.vertex_count > 0);
                next += draw.vertex_count;
            }
            assert_eq!(next, face_count * 3);
        }
    }
}

use std::mem::{offset_of, size_of};
use ash::vk;
use crate::renderer::shader_data::PerVertexData;

pub const POSITION_LOCATION: u32 = 0;
pub const NORMAL_LOCATION: u32 = 1;
pub const TEXCOORD_LOCATION: u32 = 2;

/// Vertex buffer bindings and attributes handed to the pipeline builder
#[derive(Debug, Clone)]
pub struct VertexInputDescription {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
    pub flags: vk::PipelineVertexInputStateCreateFlags,
}

impl Default for VertexInputDescription {
    /// One interleaved binding of [`PerVertexData`]
    fn default() -> Self {
        let bindings = vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<PerVertexData>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }];

        let attributes = vec![
            vk::VertexInputAttributeDescription {
                location: POSITION_LOCATION,
                binding: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: offset_of!(PerVertexData, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: NORMAL_LOCATION,
                binding: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: offset_of!(PerVertexData, normal) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: TEXCOORD_LOCATION,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(PerVertexData, texcoord) as u32,
            },
        ];

        Self {
            bindings,
            attributes,
            flags: vk::PipelineVertexInputStateCreateFlags::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaved_layout() {
        let desc = VertexInputDescription::default();
        assert_eq!(desc.bindings.len(), 1);
        assert_eq!(desc.bindings[0].stride, 40);

        let offsets: Vec<_> = desc.attributes.iter().map(|a| (a.location, a.offset)).collect();
        assert_eq!(offsets, vec![(0, 0), (1, 16), (2, 32)]);
        assert_eq!(desc.attributes[2].format, vk::Format::R32G32_SFLOAT);
    }
}

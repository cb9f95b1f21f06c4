use std::collections::HashMap;
use std::path::{Path, PathBuf};
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use smallvec::SmallVec;
use crate::renderer::core::device::RenderDevice;
use crate::renderer::core::transfer::TransferContext;
use crate::renderer::error::{RenderError, RenderResult};
use crate::renderer::resources::buffer::BufferResource;
use crate::renderer::resources::image::ImageResource;
use crate::renderer::resources::material::MaterialTable;
use crate::renderer::resources::transition::LayoutTransition;

const BYTES_PER_PIXEL: u64 = 4;

/// Slot of the 1x1 white texture sampled by materials without a usable diffuse map
pub const FALLBACK_TEXTURE_SLOT: u32 = 0;

/// Decoded texture, always RGBA8 with rows top to bottom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TexturePixels {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl TexturePixels {
    pub fn load(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .wrap_err_with(|| format!("Failed to decode texture {:?}", path))?;
        Ok(Self::from_image(image))
    }

    pub fn from_image(image: image::DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        Self {
            width: rgba.width(),
            height: rgba.height(),
            rgba: rgba.into_raw(),
        }
    }

    /// 1x1 opaque white, bound at index 0 for materials without a diffuse map
    pub fn white() -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: vec![u8::MAX; 4],
        }
    }

    pub fn byte_len(&self) -> u64 {
        self.width as u64 * self.height as u64 * BYTES_PER_PIXEL
    }
}

/// One step of a texture upload, in recording order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadCommand {
    Transition(LayoutTransition),
    CopyBufferToImage {
        buffer_bytes: u64,
        extent: vk::Extent3D,
    },
}

/// Commands that take a freshly created texture from UNDEFINED to sampled
pub fn plan_upload(width: u32, height: u32) -> RenderResult<SmallVec<[UploadCommand; 3]>> {
    let mut plan = SmallVec::new();
    plan.push(UploadCommand::Transition(LayoutTransition::between(
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    )?));
    plan.push(UploadCommand::CopyBufferToImage {
        buffer_bytes: width as u64 * height as u64 * BYTES_PER_PIXEL,
        extent: vk::Extent3D { width, height, depth: 1 },
    });
    plan.push(UploadCommand::Transition(LayoutTransition::between(
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )?));
    Ok(plan)
}

pub struct Texture {
    pub image: ImageResource,
}

impl Texture {
    /// Uploads `pixels` through a staging buffer and waits for the copy to finish
    pub fn upload(
        device: &RenderDevice,
        transfer: &TransferContext,
        pixels: &TexturePixels,
    ) -> RenderResult<Self> {
        if pixels.rgba.len() as u64 != pixels.byte_len() {
            return Err(RenderError::InvalidWrite(format!(
                "{}x{} texture with {} bytes",
                pixels.width,
                pixels.height,
                pixels.rgba.len()
            )));
        }

        let mut staging = BufferResource::new(
            device,
            pixels.byte_len(),
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::SharingMode::EXCLUSIVE,
        )?;
        staging.write(&pixels.rgba, 0)?;

        let mut image = ImageResource::new_texture(device, pixels.width, pixels.height)?;
        let plan = plan_upload(pixels.width, pixels.height)?;

        transfer.immediate_submit(|cmd, device| {
            for command in &plan {
                match *command {
                    UploadCommand::Transition(transition) => {
                        image.transition(cmd, transition.new_layout)?;
                    }
                    UploadCommand::CopyBufferToImage { extent, .. } => {
                        let copy_region = vk::BufferImageCopy {
                            buffer_offset: 0,
                            buffer_row_length: 0,
                            buffer_image_height: 0,
                            image_subresource: vk::ImageSubresourceLayers {
                                aspect_mask: image.aspect,
                                mip_level: 0,
                                base_array_layer: 0,
                                layer_count: 1,
                            },
                            image_offset: vk::Offset3D::default(),
                            image_extent: extent,
                        };
                        unsafe {
                            device.cmd_copy_buffer_to_image(
                                cmd,
                                staging.buffer,
                                image.image,
                                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                                &[copy_region],
                            );
                        }
                    }
                }
            }
            Ok(())
        })?;

        // The queue is idle here, so the staging buffer can go
        drop(staging);
        Ok(Self { image })
    }
}

/// Bounded, append-only list of textures; the position is the shader-visible index
pub struct TextureArray<T = Texture> {
    entries: Vec<T>,
    capacity: usize,
}

impl<T> TextureArray<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: T) -> RenderResult<u32> {
        if self.is_full() {
            return Err(RenderError::CapacityExceeded {
                what: "texture array",
                limit: self.capacity,
            });
        }
        self.entries.push(entry);
        Ok((self.entries.len() - 1) as u32)
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl TextureArray<Texture> {
    pub fn views(&self) -> Vec<vk::ImageView> {
        self.entries.iter().map(|t| t.image.view).collect()
    }
}

/// Loads every material's diffuse map into `textures` and points the material at its slot.
///
/// Paths are resolved against `base_dir` and loaded once each. A map that fails to load, or
/// no longer fits, is logged and the material keeps slot 0. Returns the number of new slots.
pub fn assign_texture_slots<T, F>(
    materials: &mut MaterialTable,
    base_dir: &Path,
    textures: &mut TextureArray<T>,
    mut load: F,
) -> usize
where
    F: FnMut(&Path) -> Result<T>,
{
    let mut loaded: HashMap<PathBuf, u32> = HashMap::new();
    let first_new = textures.len();

    for (_, material) in materials.iter_mut() {
        let Some(relative) = material.diffuse_texture.as_deref() else {
            continue;
        };
        let path = base_dir.join(relative);

        let slot = match loaded.get(&path) {
            Some(&slot) => Some(slot),
            None if textures.is_full() => {
                log::warn!(
                    "Skipping texture {}: {}",
                    path.display(),
                    RenderError::CapacityExceeded {
                        what: "texture array",
                        limit: textures.capacity(),
                    }
                );
                None
            }
            None => match load(&path).and_then(|t| Ok(textures.push(t)?)) {
                Ok(slot) => {
                    log::debug!("Texture {} -> slot {}", path.display(), slot);
                    loaded.insert(path.clone(), slot);
                    Some(slot)
                }
                Err(e) => {
                    log::warn!("Skipping texture {}: {:#}", path.display(), e);
                    None
                }
            },
        };

        material.properties.texture_index = slot.unwrap_or(FALLBACK_TEXTURE_SLOT);
    }

    textures.len() - first_new
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::resources::material::Material;

    #[test]
    fn upload_plan_is_barrier_copy_barrier() {
        let plan = plan_upload(4, 2).unwrap();
        assert_eq!(plan.len(), 3);

        match plan[0] {
            UploadCommand::Transition(t) => {
                assert_eq!(t.old_layout, vk::ImageLayout::UNDEFINED);
                assert_eq!(t.new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            plan[1],
            UploadCommand::CopyBufferToImage {
                buffer_bytes: 32,
                extent: vk::Extent3D { width: 4, height: 2, depth: 1 },
            }
        );
        match plan[2] {
            UploadCommand::Transition(t) => {
                assert_eq!(t.old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
                assert_eq!(t.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
                assert_eq!(t.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rgb_pixels_are_promoted_to_rgba() {
        let rgb = image::RgbImage::from_raw(2, 1, vec![10, 20, 30, 40, 50, 60]).unwrap();
        let pixels = TexturePixels::from_image(image::DynamicImage::ImageRgb8(rgb));

        assert_eq!(pixels.rgba, vec![10, 20, 30, 255, 40, 50, 60, 255]);
        // The copy covers exactly the staging bytes
        let plan = plan_upload(pixels.width, pixels.height).unwrap();
        assert!(matches!(
            plan[1],
            UploadCommand::CopyBufferToImage { buffer_bytes, .. } if buffer_bytes == pixels.rgba.len() as u64
        ));
    }

    #[test]
    fn decoded_bmp_matches_source_pixels() {
        let source = image::RgbImage::from_raw(2, 2, (0..12).collect()).unwrap();
        let mut encoded = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(source)
            .write_to(&mut encoded, image::ImageFormat::Bmp)
            .unwrap();

        let decoded = image::load_from_memory(encoded.get_ref()).unwrap();
        let pixels = TexturePixels::from_image(decoded);
        assert_eq!((pixels.width, pixels.height), (2, 2));
        assert_eq!(
            pixels.rgba,
            vec![0, 1, 2, 255, 3, 4, 5, 255, 6, 7, 8, 255, 9, 10, 11, 255]
        );
    }

    #[test]
    fn array_rejects_past_capacity() {
        let mut array = TextureArray::<u8>::new(2);
        assert_eq!(array.push(7).unwrap(), 0);
        assert_eq!(array.push(8).unwrap(), 1);
        assert!(array.is_full());
        match array.push(9) {
            Err(RenderError::CapacityExceeded { limit, .. }) => assert_eq!(limit, 2),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(array.len(), 2);
    }

    fn materials_with_maps(maps: &[Option<&str>]) -> MaterialTable {
        let mut table = MaterialTable::new();
        for (i, map) in maps.iter().enumerate() {
            let mut material = Material::new(format!("m{}", i));
            material.diffuse_texture = map.map(PathBuf::from);
            table.insert(material);
        }
        table
    }

    fn texture_indices(table: &mut MaterialTable) -> Vec<u32> {
        table.iter_mut().map(|(_, m)| m.properties.texture_index).collect()
    }

    #[test]
    fn shared_maps_are_loaded_once() {
        let mut table = materials_with_maps(&[Some("a.bmp"), None, Some("b.bmp"), Some("a.bmp")]);
        let mut textures = TextureArray::<PathBuf>::new(8);
        textures.push(PathBuf::from("white")).unwrap();

        let mut calls = 0;
        let added = assign_texture_slots(&mut table, Path::new("models"), &mut textures, |p| {
            calls += 1;
            Ok(p.to_path_buf())
        });

        assert_eq!(added, 2);
        assert_eq!(calls, 2);
        assert_eq!(texture_indices(&mut table), vec![1, 0, 2, 1]);
    }

    #[test]
    fn failed_and_overflowing_maps_fall_back_to_white() {
        let mut table = materials_with_maps(&[Some("missing.bmp"), Some("a.bmp"), Some("b.bmp")]);
        let mut textures = TextureArray::<PathBuf>::new(2);
        textures.push(PathBuf::from("white")).unwrap();

        let added = assign_texture_slots(&mut table, Path::new(""), &mut textures, |p| {
            if p.ends_with("missing.bmp") {
                Err(color_eyre::eyre::eyre!("no such file"))
            } else {
                Ok(p.to_path_buf())
            }
        });

        assert_eq!(added, 1);
        assert_eq!(texture_indices(&mut table), vec![0, 1, 0]);
    }

    #[test]
    fn white_fallback() {
        let white = TexturePixels::white();
        assert_eq!(white.byte_len(), 4);
        assert_eq!(white.rgba, vec![255; 4]);
    }
}

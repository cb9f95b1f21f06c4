use ash::vk;
use crate::renderer::error::{RenderError, RenderResult};

/// Snapshot of the device memory-type table.
///
/// Queried once when the device is created and owned by it. Resolution walks the table in
/// index order and returns the first type allowed by the resource that carries every
/// requested property flag.
#[derive(Debug, Clone, Default)]
pub struct MemoryCapabilities {
    types: Vec<vk::MemoryPropertyFlags>,
}

impl MemoryCapabilities {
    pub fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let props = unsafe { instance.get_physical_device_memory_properties(physical_device) };
        Self::from_properties(&props)
    }

    pub fn from_properties(props: &vk::PhysicalDeviceMemoryProperties) -> Self {
        Self::from_property_flags(
            props
                .memory_types_as_slice()
                .iter()
                .map(|memory_type| memory_type.property_flags),
        )
    }

    pub fn from_property_flags<I>(flags: I) -> Self
    where
        I: IntoIterator<Item = vk::MemoryPropertyFlags>,
    {
        Self {
            types: flags.into_iter().take(vk::MAX_MEMORY_TYPES).collect(),
        }
    }

    pub fn property_flags(&self, index: u32) -> Option<vk::MemoryPropertyFlags> {
        self.types.get(index as usize).copied()
    }

    /// First index whose bit is set in `type_bits` and whose flags contain all of `required`
    pub fn resolve(&self, type_bits: u32, required: vk::MemoryPropertyFlags) -> Option<u32> {
        self.types
            .iter()
            .enumerate()
            .find(|&(i, flags)| type_bits & (1 << i) != 0 && flags.contains(required))
            .map(|(i, _)| i as u32)
    }

    /// Like [`Self::resolve`], retrying once with no property requirements
    pub fn resolve_or_fallback(
        &self,
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    ) -> RenderResult<u32> {
        if let Some(index) = self.resolve(type_bits, required) {
            return Ok(index);
        }

        log::warn!(
            "No memory type with {:?} in mask {:#b}, falling back to any allowed type",
            required,
            type_bits,
        );
        self.resolve(type_bits, vk::MemoryPropertyFlags::empty())
            .ok_or_else(|| {
                RenderError::ResourceAllocationFailure(format!(
                    "no memory type matches mask {:#b}",
                    type_bits
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE_LOCAL: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
    const HOST_VISIBLE: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_VISIBLE;
    const HOST_COHERENT: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_COHERENT;

    fn typical_discrete() -> MemoryCapabilities {
        MemoryCapabilities::from_property_flags([
            DEVICE_LOCAL,
            HOST_VISIBLE | HOST_COHERENT,
            DEVICE_LOCAL | HOST_VISIBLE | HOST_COHERENT,
        ])
    }

    #[test]
    fn first_matching_type_wins() {
        let caps = typical_discrete();
        assert_eq!(caps.resolve(0b111, DEVICE_LOCAL), Some(0));
        assert_eq!(caps.resolve(0b111, HOST_VISIBLE), Some(1));
        assert_eq!(caps.resolve(0b111, DEVICE_LOCAL | HOST_VISIBLE), Some(2));
    }

    #[test]
    fn type_bits_exclude_types() {
        let caps = typical_discrete();
        assert_eq!(caps.resolve(0b110, DEVICE_LOCAL), Some(2));
        assert_eq!(caps.resolve(0b001, HOST_VISIBLE), None);
        assert_eq!(caps.resolve(0, vk::MemoryPropertyFlags::empty()), None);
    }

    #[test]
    fn partial_flag_match_is_rejected() {
        let caps = MemoryCapabilities::from_property_flags([HOST_VISIBLE]);
        assert_eq!(caps.resolve(0b1, HOST_VISIBLE | HOST_COHERENT), None);
    }

    #[test]
    fn fallback_drops_requirements() {
        let caps = MemoryCapabilities::from_property_flags([DEVICE_LOCAL, DEVICE_LOCAL]);
        assert_eq!(caps.resolve_or_fallback(0b10, HOST_VISIBLE).unwrap(), 1);
    }

    #[test]
    fn fallback_fails_when_mask_is_empty() {
        let caps = typical_discrete();
        let err = caps.resolve_or_fallback(0b1000, HOST_VISIBLE).unwrap_err();
        assert!(matches!(err, RenderError::ResourceAllocationFailure(_)));
    }

    #[test]
    fn resolver_agrees_with_definition_on_small_tables() {
        let flag_choices = [
            vk::MemoryPropertyFlags::empty(),
            DEVICE_LOCAL,
            HOST_VISIBLE,
            DEVICE_LOCAL | HOST_VISIBLE,
        ];

        for a in flag_choices {
            for b in flag_choices {
                for c in flag_choices {
                    let table = [a, b, c];
                    let caps = MemoryCapabilities::from_property_flags(table);
                    for type_bits in 0..8u32 {
                        for required in flag_choices {
                            let allowed = |i: usize| {
                                type_bits & (1 << i) != 0 && table[i].contains(required)
                            };
                            match caps.resolve(type_bits, required) {
                                Some(found) => {
                                    let found = found as usize;
                                    assert!(allowed(found));
                                    assert!((0..found).all(|i| !allowed(i)));
                                }
                                None => assert!((0..3).all(|i| !allowed(i))),
                            }
                        }
                    }
                }
            }
        }
    }
}

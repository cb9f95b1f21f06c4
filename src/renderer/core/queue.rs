use ash::vk;

pub struct Queue {
    pub family: QueueFamily,
    pub handle: vk::Queue,
}

impl Queue {
    pub fn new(family: QueueFamily, handle: vk::Queue) -> Self {
        Self { family, handle }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueueFamily {
    pub index: u32,
    pub properties: vk::QueueFamilyProperties,
}

impl QueueFamily {
    /// First family in `props` that can run graphics work
    pub fn find_graphics(props: &[vk::QueueFamilyProperties]) -> Option<Self> {
        props
            .iter()
            .position(|p| p.queue_count > 0 && p.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|i| Self {
                index: i as u32,
                properties: props[i],
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn picks_first_graphics_family() {
        let props = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let found = QueueFamily::find_graphics(&props).unwrap();
        assert_eq!(found.index, 2);
        assert!(found.properties.queue_flags.contains(vk::QueueFlags::GRAPHICS));
    }

    #[test]
    fn no_graphics_family() {
        let props = [family(vk::QueueFlags::TRANSFER), family(vk::QueueFlags::COMPUTE)];
        assert!(QueueFamily::find_graphics(&props).is_none());
        assert!(QueueFamily::find_graphics(&[]).is_none());
    }
}

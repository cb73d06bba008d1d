//! Physical device (GPU) selection.
//!
//! A GPU qualifies when it exposes a graphics queue, a queue that can present
//! to the window surface, Vulkan 1.3, and the feature set the frame pipeline
//! is written against (see [`RequiredFeatures`]). Among qualifying GPUs,
//! discrete ones win, then larger device-local heaps.

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};

/// Queue family indices used by the renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Distinct family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);
        families.extend(self.graphics_family);
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }
        families
    }
}

/// Core 1.2/1.3 features the renderer cannot run without.
///
/// Each flag maps onto a `vk::PhysicalDeviceVulkan1xFeatures` member of the
/// same name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequiredFeatures {
    pub timeline_semaphore: bool,
    pub buffer_device_address: bool,
    pub descriptor_binding_partially_bound: bool,
    pub runtime_descriptor_array: bool,
    pub dynamic_rendering: bool,
    pub synchronization2: bool,
}

impl RequiredFeatures {
    fn query(instance: &ash::Instance, device: vk::PhysicalDevice) -> Self {
        let mut features_1_2 = vk::PhysicalDeviceVulkan12Features::default();
        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default();
        let mut features = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut features_1_2)
            .push_next(&mut features_1_3);
        unsafe { instance.get_physical_device_features2(device, &mut features) };

        Self {
            timeline_semaphore: features_1_2.timeline_semaphore == vk::TRUE,
            buffer_device_address: features_1_2.buffer_device_address == vk::TRUE,
            descriptor_binding_partially_bound: features_1_2.descriptor_binding_partially_bound
                == vk::TRUE,
            runtime_descriptor_array: features_1_2.runtime_descriptor_array == vk::TRUE,
            dynamic_rendering: features_1_3.dynamic_rendering == vk::TRUE,
            synchronization2: features_1_3.synchronization2 == vk::TRUE,
        }
    }

    /// Names of the features this device lacks.
    pub fn missing(&self) -> Vec<&'static str> {
        let checks = [
            (self.timeline_semaphore, "timelineSemaphore"),
            (self.buffer_device_address, "bufferDeviceAddress"),
            (
                self.descriptor_binding_partially_bound,
                "descriptorBindingPartiallyBound",
            ),
            (self.runtime_descriptor_array, "runtimeDescriptorArray"),
            (self.dynamic_rendering, "dynamicRendering"),
            (self.synchronization2, "synchronization2"),
        ];
        checks
            .into_iter()
            .filter_map(|(present, name)| (!present).then_some(name))
            .collect()
    }
}

/// A selected GPU and what the renderer needs to know about it.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let version = self.properties.api_version;
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field(
                "api_version",
                &format!(
                    "{}.{}.{}",
                    vk::api_version_major(version),
                    vk::api_version_minor(version),
                    vk::api_version_patch(version)
                ),
            )
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Picks the best GPU able to render to `surface`.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    info!("Found {} GPU(s)", devices.len());

    let best = devices
        .into_iter()
        .filter_map(|device| inspect_device(instance, device, surface, surface_loader))
        .max_by_key(rate_device);

    match best {
        Some(selected) => {
            info!(
                "Selected GPU '{}' ({}, {} MiB device-local)",
                selected.device_name(),
                selected.device_type_name(),
                selected.device_local_memory() / (1024 * 1024)
            );
            Ok(selected)
        }
        None => {
            warn!("No GPU supports the required queues and Vulkan 1.3 features");
            Err(RhiError::NoSuitableGpu)
        }
    }
}

fn inspect_device(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
    let name = properties
        .device_name_as_c_str()
        .unwrap_or(c"Unknown")
        .to_string_lossy()
        .into_owned();

    if !supports_api_1_3(properties.api_version) {
        debug!("GPU '{}' skipped: Vulkan 1.3 not supported", name);
        return None;
    }

    let missing = RequiredFeatures::query(instance, device).missing();
    if !missing.is_empty() {
        debug!("GPU '{}' skipped: missing features {:?}", name, missing);
        return None;
    }

    let queue_families = find_queue_families(instance, device, surface, surface_loader);
    if !queue_families.is_complete() {
        debug!("GPU '{}' skipped: no graphics or present queue", name);
        return None;
    }

    Some(PhysicalDeviceInfo {
        device,
        properties,
        memory_properties,
        queue_families,
    })
}

fn supports_api_1_3(version: u32) -> bool {
    let major = vk::api_version_major(version);
    let minor = vk::api_version_minor(version);
    major > 1 || (major == 1 && minor >= 3)
}

fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let mut indices = QueueFamilyIndices::default();

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        if family.queue_count == 0 {
            continue;
        }
        let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let present = unsafe {
            surface_loader
                .get_physical_device_surface_support(device, index, surface)
                .unwrap_or(false)
        };

        // A family that does both avoids queue ownership transfers.
        if graphics && present {
            return QueueFamilyIndices {
                graphics_family: Some(index),
                present_family: Some(index),
            };
        }
        if graphics && indices.graphics_family.is_none() {
            indices.graphics_family = Some(index);
        }
        if present && indices.present_family.is_none() {
            indices.present_family = Some(index);
        }
    }
    indices
}

fn rate_device(info: &PhysicalDeviceInfo) -> u64 {
    let type_score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1 << 40,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1 << 36,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 1 << 32,
        _ => 0,
    };
    type_score + info.device_local_memory() / (1024 * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_families_deduplicates() {
        let shared = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert_eq!(shared.unique_families(), vec![0]);

        let split = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(2),
        };
        assert_eq!(split.unique_families(), vec![0, 2]);
    }

    #[test]
    fn test_incomplete_families() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(1),
            present_family: None,
        };
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_missing_features_reported_by_name() {
        let features = RequiredFeatures {
            timeline_semaphore: false,
            buffer_device_address: true,
            descriptor_binding_partially_bound: true,
            runtime_descriptor_array: true,
            dynamic_rendering: true,
            synchronization2: false,
        };
        assert_eq!(
            features.missing(),
            vec!["timelineSemaphore", "synchronization2"]
        );
    }

    #[test]
    fn test_api_version_gate() {
        assert!(supports_api_1_3(vk::API_VERSION_1_3));
        assert!(!supports_api_1_3(vk::API_VERSION_1_2));
        assert!(supports_api_1_3(vk::make_api_version(0, 2, 0, 0)));
    }
}

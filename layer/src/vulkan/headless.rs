//! A device created directly, without the loader chain or a window.
//!
//! Wraps the device in the same [`VulkanDevice`] the layer builds for an
//! application, so the device interface can be exercised in tests.

use std::ffi::{CStr, CString};
use std::sync::Arc;

use ash::vk;

use super::debug::create_debug_messenger;
use super::device::{DeviceParams, QueueInfo, VulkanDevice};
use crate::config::LayerConfig;
use crate::error::{LayerError, LayerResult};

/// Device extensions enabled when the physical device supports them.
const OPTIONAL_DEVICE_EXTENSIONS: [&CStr; 1] = [ash::khr::push_descriptor::NAME];

pub struct HeadlessContext {
    _entry: ash::Entry,
    instance: ash::Instance,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    native: ash::Device,
    device: Arc<VulkanDevice>,
}

impl HeadlessContext {
    /// Create a context with the default configuration, or `None` if no
    /// usable Vulkan implementation is present.
    pub fn new() -> Option<Self> {
        Self::with_config(LayerConfig::new())
    }

    pub fn with_config(config: LayerConfig) -> Option<Self> {
        match Self::create(config) {
            Ok(context) => Some(context),
            Err(e) => {
                log::warn!("headless Vulkan context unavailable: {e}");
                None
            }
        }
    }

    fn create(config: LayerConfig) -> LayerResult<Self> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| LayerError::Unsupported(format!("failed to load Vulkan: {e}")))?;

        let available = unsafe { entry.enumerate_instance_extension_properties(None) }?;
        let has_debug_utils = available
            .iter()
            .any(|ext| ext.extension_name_as_c_str() == Ok(ash::ext::debug_utils::NAME));
        let mut instance_extensions = Vec::new();
        if has_debug_utils {
            instance_extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let app_name = c"redlilium-layer-headless";
        let app_info = vk::ApplicationInfo::default()
            .application_name(app_name)
            .engine_name(app_name)
            .api_version(vk::API_VERSION_1_1);
        let instance_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&instance_extensions);
        let instance = unsafe { entry.create_instance(&instance_info, None) }?;

        match Self::create_device(&entry, &instance, has_debug_utils, config) {
            Ok((native, device, debug_utils)) => Ok(Self {
                _entry: entry,
                instance,
                debug_utils,
                native,
                device,
            }),
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                Err(e)
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn create_device(
        entry: &ash::Entry,
        instance: &ash::Instance,
        has_debug_utils: bool,
        config: LayerConfig,
    ) -> LayerResult<(
        ash::Device,
        Arc<VulkanDevice>,
        Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    )> {
        let (physical_device, family_index, flags) = select_physical_device(instance)?;

        let supported = unsafe { instance.enumerate_device_extension_properties(physical_device) }?;
        let enabled_extensions: Vec<CString> = OPTIONAL_DEVICE_EXTENSIONS
            .iter()
            .filter(|name| {
                supported
                    .iter()
                    .any(|ext| ext.extension_name_as_c_str() == Ok(**name))
            })
            .map(|name| CString::from(*name))
            .collect();
        let extension_ptrs: Vec<_> = enabled_extensions.iter().map(|ext| ext.as_ptr()).collect();

        let features = unsafe { instance.get_physical_device_features(physical_device) };
        let priorities = [1.0];
        let queue_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(family_index)
            .queue_priorities(&priorities)];
        let device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features);
        let native = unsafe { instance.create_device(physical_device, &device_info, None) }?;
        let queue = unsafe { native.get_device_queue(family_index, 0) };

        let params = DeviceParams {
            instance: instance.clone(),
            physical_device,
            device: native.clone(),
            enabled_extensions,
            enabled_features: features,
            debug_utils: has_debug_utils,
            queues: vec![QueueInfo {
                queue,
                family_index,
                flags,
            }],
            set_loader_data: None,
            config,
        };
        let device = match VulkanDevice::new(params) {
            Ok(device) => device,
            Err(e) => {
                unsafe { native.destroy_device(None) };
                return Err(e);
            }
        };

        let debug_utils = has_debug_utils.then(|| {
            let loader = ash::ext::debug_utils::Instance::new(entry, instance);
            match create_debug_messenger(&loader) {
                Ok(messenger) => Some((loader, messenger)),
                Err(e) => {
                    log::debug!("no debug messenger: {e}");
                    None
                }
            }
        });
        Ok((native, device, debug_utils.flatten()))
    }

    pub fn device(&self) -> &Arc<VulkanDevice> {
        &self.device
    }
}

fn select_physical_device(
    instance: &ash::Instance,
) -> LayerResult<(vk::PhysicalDevice, u32, vk::QueueFlags)> {
    let physical_devices = unsafe { instance.enumerate_physical_devices() }?;
    let mut candidates: Vec<_> = physical_devices
        .into_iter()
        .filter_map(|physical_device| {
            let families =
                unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
            let (index, family) = families
                .iter()
                .enumerate()
                .find(|(_, family)| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))?;
            let properties = unsafe { instance.get_physical_device_properties(physical_device) };
            Some((physical_device, index as u32, family.queue_flags, properties.device_type))
        })
        .collect();
    candidates.sort_by_key(|(_, _, _, device_type)| match *device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        _ => 3,
    });
    candidates
        .into_iter()
        .next()
        .map(|(physical_device, index, flags, _)| (physical_device, index, flags))
        .ok_or_else(|| LayerError::Unsupported("no graphics-capable physical device".into()))
}

impl Drop for HeadlessContext {
    fn drop(&mut self) {
        self.device.shutdown();
        unsafe {
            self.native.destroy_device(None);
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

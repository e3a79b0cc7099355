// Device Context - Core GPU interface
//
// Responsibilities:
// - Instance creation with the surface provider's extensions
// - Optional validation layer + debug messenger
// - Surface creation
// - Physical device selection and queue family resolution
// - Logical device + graphics/present queues
//
// Every handle lives in a guard with its own Drop, so a failure halfway
// through bring-up releases what was already created.

use crate::backend::surface::SurfaceProvider;
use crate::error::{FrameStep, RendererError, Result, VkResultExt};
use ash::extensions::{ext::DebugUtils, khr};
use ash::{vk, Entry};
use std::ffi::{CStr, CString};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

static QUEUE_PRIORITIES: [f32; 1] = [1.0];

// =============================================================================
// PHYSICAL DEVICE SELECTION
// =============================================================================

/// How to pick among enumerated GPUs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceSelection {
    /// Take the first device the driver reports
    #[default]
    First,
    /// Score by device type, first device wins ties
    PreferDiscrete,
}

impl DeviceSelection {
    /// Index of the chosen device in `device_types`
    pub fn pick(self, device_types: &[vk::PhysicalDeviceType]) -> Option<usize> {
        match self {
            DeviceSelection::First => (!device_types.is_empty()).then_some(0),
            DeviceSelection::PreferDiscrete => {
                let mut best: Option<(usize, u32)> = None;
                for (index, &device_type) in device_types.iter().enumerate() {
                    let score = device_type_score(device_type);
                    if best.map_or(true, |(_, best_score)| score > best_score) {
                        best = Some((index, score));
                    }
                }
                best.map(|(index, _)| index)
            }
        }
    }
}

fn device_type_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 10,
        vk::PhysicalDeviceType::CPU => 2,
        _ => 1,
    }
}

// =============================================================================
// QUEUE FAMILIES
// =============================================================================

/// Resolution state of one queue role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FamilySlot {
    #[default]
    Unresolved,
    Resolved(u32),
}

impl FamilySlot {
    pub fn index(self) -> Option<u32> {
        match self {
            FamilySlot::Unresolved => None,
            FamilySlot::Resolved(index) => Some(index),
        }
    }

    pub fn is_resolved(self) -> bool {
        matches!(self, FamilySlot::Resolved(_))
    }
}

/// Single-pass search for a graphics family and a present family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueFamilyScan {
    pub graphics: FamilySlot,
    pub present: FamilySlot,
}

impl QueueFamilyScan {
    /// Walk the families once, stopping as soon as both roles resolve.
    ///
    /// `supports_present` is asked about a family only while the present
    /// role is still unresolved.
    pub fn run<F>(families: &[vk::QueueFamilyProperties], mut supports_present: F) -> Result<Self>
    where
        F: FnMut(u32) -> Result<bool>,
    {
        let mut scan = Self::default();
        let mut candidates = families.iter().enumerate();

        while !scan.is_complete() {
            let Some((index, properties)) = candidates.next() else {
                break;
            };
            let index = index as u32;

            if !scan.graphics.is_resolved()
                && properties.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            {
                scan.graphics = FamilySlot::Resolved(index);
            }

            if !scan.present.is_resolved() && supports_present(index)? {
                scan.present = FamilySlot::Resolved(index);
            }
        }

        Ok(scan)
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_resolved() && self.present.is_resolved()
    }

    pub fn resolve(self) -> Result<QueueFamilies> {
        match (self.graphics, self.present) {
            (FamilySlot::Resolved(graphics), FamilySlot::Resolved(present)) => {
                Ok(QueueFamilies { graphics, present })
            }
            _ => Err(RendererError::NoSuitableQueueFamily {
                graphics: self.graphics.index(),
                present: self.present.index(),
            }),
        }
    }
}

/// Resolved queue family indices (may alias)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct families, graphics first
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// One queue-create entry per distinct family, one queue each
pub fn queue_create_infos(families: &QueueFamilies) -> Vec<vk::DeviceQueueCreateInfo> {
    families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(&QUEUE_PRIORITIES)
                .build()
        })
        .collect()
}

/// Whether `name` is among the enumerated instance layers
pub fn has_layer(layers: &[vk::LayerProperties], name: &CStr) -> bool {
    layers.iter().any(|layer| {
        let layer_name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
        layer_name == name
    })
}

// =============================================================================
// OWNED HANDLES
// =============================================================================

struct InstanceGuard {
    instance: ash::Instance,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    entry: Entry,
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

struct SurfaceGuard {
    loader: khr::Surface,
    surface: vk::SurfaceKHR,
}

impl Drop for SurfaceGuard {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.surface, None) };
    }
}

// =============================================================================
// DEVICE CONTEXT
// =============================================================================

/// Instance, surface, physical + logical device and their queues.
///
/// Fields drop after the logical device is destroyed: surface, then instance.
pub struct DeviceContext {
    pub device: ash::Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub queue_families: QueueFamilies,
    pub physical_device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    surface: SurfaceGuard,
    instance: InstanceGuard,
}

impl DeviceContext {
    /// Bring up everything up to and including the logical device
    ///
    /// # Arguments
    /// * `provider` - Window that supplies extensions and the surface
    /// * `app_name` - Application name reported to the driver
    /// * `enable_validation` - Request the Khronos validation layer
    /// * `selection` - Physical device policy
    pub fn new<P: SurfaceProvider + ?Sized>(
        provider: &P,
        app_name: &str,
        enable_validation: bool,
        selection: DeviceSelection,
    ) -> Result<Self> {
        log::info!("Creating Vulkan device context: {}", app_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }?;

        // Step 2: Instance (+ debug messenger)
        let instance = Self::create_instance(entry, provider, app_name, enable_validation)?;

        // Step 3: Surface
        let surface = SurfaceGuard {
            loader: khr::Surface::new(&instance.entry, &instance.instance),
            surface: unsafe { provider.create_surface(&instance.entry, &instance.instance)? },
        };

        // Step 4: Physical device
        let physical_device = Self::pick_physical_device(&instance.instance, selection)?;
        let properties =
            unsafe { instance.instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.instance.get_physical_device_memory_properties(physical_device) };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        // Step 5: Queue families
        let families = unsafe {
            instance
                .instance
                .get_physical_device_queue_family_properties(physical_device)
        };
        let queue_families = QueueFamilyScan::run(&families, |index| {
            unsafe {
                surface.loader.get_physical_device_surface_support(
                    physical_device,
                    index,
                    surface.surface,
                )
            }
            .init_step("query surface support")
        })?
        .resolve()?;

        log::info!(
            "Queue families: graphics={} present={}",
            queue_families.graphics,
            queue_families.present
        );

        // Step 6: Logical device
        let device =
            Self::create_logical_device(&instance.instance, physical_device, &queue_families)?;

        // Step 7: Queues
        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            queue_families,
            physical_device,
            properties,
            memory_properties,
            surface,
            instance,
        })
    }

    fn create_instance<P: SurfaceProvider + ?Sized>(
        entry: Entry,
        provider: &P,
        app_name: &str,
        enable_validation: bool,
    ) -> Result<InstanceGuard> {
        let required = provider.required_instance_extensions()?;
        if required.is_empty() {
            return Err(RendererError::NoInstanceExtensions);
        }

        log::info!("Enabled instance extensions:");
        for name in &required {
            log::info!("\t{}", name.to_string_lossy());
        }

        let validation = enable_validation && Self::validation_layer_available(&entry)?;
        if enable_validation && !validation {
            log::warn!(
                "{} not installed, continuing without validation",
                VALIDATION_LAYER.to_string_lossy()
            );
        }

        let mut extensions: Vec<_> = required.iter().map(|name| name.as_ptr()).collect();
        let layers = if validation {
            extensions.push(DebugUtils::name().as_ptr());
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let app_name_cstr = CString::new(app_name).unwrap_or_default();
        let engine_name = c"triangle-renderer";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance =
            unsafe { entry.create_instance(&create_info, None) }.init_step("create instance")?;

        let mut guard = InstanceGuard {
            instance,
            debug_utils: None,
            entry,
        };

        if validation {
            guard.debug_utils = Some(Self::setup_debug_messenger(&guard.entry, &guard.instance)?);
        }

        Ok(guard)
    }

    fn validation_layer_available(entry: &Entry) -> Result<bool> {
        let layers = entry
            .enumerate_instance_layer_properties()
            .init_step("enumerate instance layers")?;

        Ok(has_layer(&layers, VALIDATION_LAYER))
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .init_step("create debug messenger")?;

        Ok((debug_utils, messenger))
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        selection: DeviceSelection,
    ) -> Result<vk::PhysicalDevice> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .init_step("enumerate physical devices")?;

        let device_types: Vec<_> = devices
            .iter()
            .map(|&device| unsafe { instance.get_physical_device_properties(device) }.device_type)
            .collect();

        selection
            .pick(&device_types)
            .map(|index| devices[index])
            .ok_or(RendererError::NoPhysicalDevice)
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: &QueueFamilies,
    ) -> Result<ash::Device> {
        let queue_infos = queue_create_infos(queue_families);
        let extensions = [khr::Swapchain::name().as_ptr()];
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        unsafe { instance.create_device(physical_device, &create_info, None) }
            .init_step("create logical device")
    }

    pub fn entry(&self) -> &Entry {
        &self.instance.entry
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance.instance
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface.surface
    }

    pub fn surface_loader(&self) -> &khr::Surface {
        &self.surface.loader
    }

    /// Block until every queue on the device is idle
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.frame_step(FrameStep::WaitIdle)
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Wait for device to finish
        let _ = self.wait_idle();

        unsafe { self.device.destroy_device(None) };
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("[Vulkan] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("[Vulkan] {}", message),
        _ => log::debug!("[Vulkan] {}", message),
    }

    vk::FALSE
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
    fn test_shared_family_resolves_to_same_index() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let scan = QueueFamilyScan::run(&families, |_| Ok(true)).unwrap();
        let resolved = scan.resolve().unwrap();

        assert_eq!(resolved, QueueFamilies { graphics: 0, present: 0 });
        assert!(resolved.is_shared());
        assert_eq!(queue_create_infos(&resolved).len(), 1);
    }

    #[test]
    fn test_disjoint_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let scan = QueueFamilyScan::run(&families, |index| Ok(index == 1)).unwrap();
        let resolved = scan.resolve().unwrap();

        assert_eq!(resolved, QueueFamilies { graphics: 0, present: 1 });
        let infos = queue_create_infos(&resolved);
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].queue_family_index, 0);
        assert_eq!(infos[1].queue_family_index, 1);
        assert_eq!(infos[1].queue_count, 1);
    }

    #[test]
    fn test_graphics_bit_is_a_real_capability_test() {
        // A compute-only family must not be taken for graphics
        let families = [
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let scan = QueueFamilyScan::run(&families, |_| Ok(true)).unwrap();

        assert_eq!(scan.graphics, FamilySlot::Resolved(1));
        assert_eq!(scan.present, FamilySlot::Resolved(0));
    }

    #[test]
    fn test_scan_stops_once_both_resolved() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let mut probed = Vec::new();
        QueueFamilyScan::run(&families, |index| {
            probed.push(index);
            Ok(true)
        })
        .unwrap();

        assert_eq!(probed, vec![0]);
    }

    #[test]
    fn test_missing_present_is_fatal() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let err = QueueFamilyScan::run(&families, |_| Ok(false))
            .unwrap()
            .resolve()
            .unwrap_err();

        match err {
            RendererError::NoSuitableQueueFamily { graphics, present } => {
                assert_eq!(graphics, Some(0));
                assert_eq!(present, None);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_probe_error_propagates() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let result = QueueFamilyScan::run(&families, |_| {
            Err(RendererError::Init {
                step: "query surface support",
                result: vk::Result::ERROR_SURFACE_LOST_KHR,
            })
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_scan_is_idempotent() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
        ];
        let probe = |index: u32| -> Result<bool> { Ok(index == 2) };
        let first = QueueFamilyScan::run(&families, probe).unwrap();
        let second = QueueFamilyScan::run(&families, probe).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_device_selection() {
        let types = [
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            vk::PhysicalDeviceType::DISCRETE_GPU,
            vk::PhysicalDeviceType::DISCRETE_GPU,
        ];
        assert_eq!(DeviceSelection::First.pick(&types), Some(0));
        assert_eq!(DeviceSelection::PreferDiscrete.pick(&types), Some(1));
        assert_eq!(DeviceSelection::First.pick(&[]), None);
        assert_eq!(DeviceSelection::PreferDiscrete.pick(&[]), None);
    }

    fn layer(name: &CStr) -> vk::LayerProperties {
        let mut properties = vk::LayerProperties::default();
        for (dst, &src) in properties.layer_name.iter_mut().zip(name.to_bytes()) {
            *dst = src as std::ffi::c_char;
        }
        properties
    }

    #[test]
    fn test_validation_layer_lookup() {
        let layers = [
            layer(c"VK_LAYER_MESA_device_select"),
            layer(VALIDATION_LAYER),
        ];
        assert!(has_layer(&layers, VALIDATION_LAYER));
        assert!(!has_layer(&layers[..1], VALIDATION_LAYER));
        assert!(!has_layer(&[], VALIDATION_LAYER));
    }
}

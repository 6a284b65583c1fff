//! Plain data types shared by the provider traits and the fixture machinery.
//!
//! Nothing in this module talks to a provider. The types describe what a
//! provider reports (data centers, products, images, resources) and what the
//! harness records about the fixtures it manages.
//!
//! # Reserved Labels
//!
//! | Label | Meaning |
//! |-------|---------|
//! | [`STATELESS`] | any pre-existing resource of the kind; never provisioned |
//! | [`STATEFUL`] | the shared fixture the harness provisions for prerequisites |
//! | [`REMOVED`] | a fixture provisioned so a test can destroy it |

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Label for "any existing resource of this kind will do".
pub const STATELESS: &str = "stateless";

/// Label under which shared, harness-owned prerequisites are provisioned.
pub const STATEFUL: &str = "stateful";

/// Label for a fixture that a test intends to destroy.
pub const REMOVED: &str = "removed";

/// Kind of cloud resource tracked by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ResourceKind {
    /// Virtual machine.
    Vm,
    /// Machine image.
    Image,
    /// Volume snapshot.
    Snapshot,
    /// Block volume.
    Volume,
    /// Static (reserved) IP address.
    StaticIp,
    /// Shell keypair.
    Keypair,
    /// Network / VLAN.
    Network,
}

impl ResourceKind {
    /// Number of kinds.
    pub const COUNT: usize = 7;

    /// Every kind, in teardown order.
    ///
    /// VMs go first because everything else may be referenced by a VM;
    /// snapshots go before the volumes they were taken from.
    pub const TEARDOWN_ORDER: [ResourceKind; Self::COUNT] = [
        ResourceKind::Vm,
        ResourceKind::Image,
        ResourceKind::Snapshot,
        ResourceKind::Volume,
        ResourceKind::StaticIp,
        ResourceKind::Keypair,
        ResourceKind::Network,
    ];

    /// Dense index used for per-kind storage.
    #[inline]
    pub const fn index(&self) -> usize {
        match self {
            Self::Vm => 0,
            Self::Image => 1,
            Self::Snapshot => 2,
            Self::Volume => 3,
            Self::StaticIp => 4,
            Self::Keypair => 5,
            Self::Network => 6,
        }
    }

    /// Returns the kind as a short lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Vm => "vm",
            Self::Image => "image",
            Self::Snapshot => "snapshot",
            Self::Volume => "volume",
            Self::StaticIp => "ip",
            Self::Keypair => "key",
            Self::Network => "vlan",
        }
    }

    /// Returns `true` if resources of this kind have a [`VmState`] that can be driven.
    pub const fn has_vm_state(&self) -> bool {
        matches!(self, Self::Vm)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provider-abstraction virtual machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum VmState {
    Pending,
    Running,
    Pausing,
    Paused,
    Stopping,
    Stopped,
    Suspending,
    Suspended,
    Rebooting,
    Terminated,
}

impl VmState {
    /// Returns `true` for in-progress states that settle on their own.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Pausing | Self::Rebooting | Self::Stopping | Self::Suspending
        )
    }

    /// Returns the state as a string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Pausing => "pausing",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Suspending => "suspending",
            Self::Suspended => "suspended",
            Self::Rebooting => "rebooting",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State of a resource as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ResourceState {
    /// Virtual machine state.
    Machine(VmState),
    /// Created and usable.
    Available,
    /// Still being created.
    Pending,
    /// Being removed or already gone.
    Deleted,
}

impl ResourceState {
    /// Returns the VM state, if this is a machine.
    pub const fn vm_state(&self) -> Option<VmState> {
        match self {
            Self::Machine(state) => Some(*state),
            _ => None,
        }
    }
}

/// A resource as reported by [`CloudProvider::get`](crate::CloudProvider::get).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Resource {
    pub kind: ResourceKind,
    /// Provider-assigned identifier.
    pub id: String,
    pub name: String,
    pub data_center: Option<String>,
    pub state: ResourceState,
}

/// What the harness knows about one fixture.
///
/// Records are never mutated in place; a state change on the provider side
/// does not touch the record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResourceRecord {
    pub kind: ResourceKind,
    pub label: String,
    /// Provider-assigned identifier.
    pub provider_id: String,
    /// `true` if the resource existed before this run and must not be destroyed.
    pub pool_origin: bool,
}

/// CPU architecture of images and products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Architecture {
    I64,
    Power,
    I32,
    Sparc,
}

impl Architecture {
    /// Order in which architectures are searched for a default image.
    pub const SEARCH_ORDER: [Architecture; 4] = [
        Architecture::I64,
        Architecture::Power,
        Architecture::I32,
        Architecture::Sparc,
    ];
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I64 => write!(f, "x86_64"),
            Self::Power => write!(f, "power"),
            Self::I32 => write!(f, "i386"),
            Self::Sparc => write!(f, "sparc"),
        }
    }
}

/// Operating system platform of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Platform {
    Ubuntu,
    CentOs,
    Windows,
    Unknown,
}

impl Platform {
    /// Order in which platforms are searched for a default image.
    pub const SEARCH_ORDER: [Platform; 3] = [Platform::Ubuntu, Platform::CentOs, Platform::Windows];

    /// Returns `true` for Windows platforms.
    pub const fn is_windows(&self) -> bool {
        matches!(self, Self::Windows)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ubuntu => write!(f, "ubuntu"),
            Self::CentOs => write!(f, "centos"),
            Self::Windows => write!(f, "windows"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A data center (zone) in the provider's region.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DataCenter {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub available: bool,
}

/// A virtual machine product (instance size).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VmProduct {
    pub id: String,
    pub name: String,
    /// RAM in megabytes.
    pub ram_mb: u32,
    pub cpu_count: u32,
}

/// Where an image is listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ImageCatalog {
    /// Images owned by the account.
    Private,
    /// Images published by the provider or third parties.
    Public,
}

/// How an image is backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ImageType {
    /// Root disk is a block volume.
    Volume,
    /// Root disk is instance storage.
    Storage,
}

/// Lifecycle state of a machine image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ImageState {
    Active,
    Pending,
    Deleted,
}

/// A machine image as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MachineImage {
    pub id: String,
    pub name: String,
    pub architecture: Architecture,
    pub platform: Platform,
    pub image_type: ImageType,
    pub state: ImageState,
    /// Bundled software description; empty for a bare OS image.
    pub software: String,
}

/// Filter passed to [`CloudProvider::list_images`](crate::CloudProvider::list_images).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageFilter {
    pub architecture: Architecture,
    pub platform: Platform,
    pub image_type: ImageType,
}

/// A volume product.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VolumeProduct {
    pub id: String,
    pub name: String,
    /// Fixed size in gigabytes, for clouds where the product determines the size.
    pub size_gb: Option<u32>,
    /// Monthly cost per gigabyte, when the provider reports one.
    pub monthly_gb_cost: Option<f64>,
}

/// Whether launching something needs a given input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Requirement {
    /// The input is not accepted.
    #[default]
    None,
    /// The input is accepted but not needed.
    Optional,
    /// The input must be supplied.
    Required,
}

/// Compute capabilities reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ComputeCapabilities {
    pub password: Requirement,
    pub shell_key: Requirement,
    pub static_ip: Requirement,
    pub vlan: Requirement,
    pub root_volume_product: Requirement,
    pub pause: bool,
    pub start_stop: bool,
    pub suspend: bool,
}

impl ComputeCapabilities {
    /// Returns `true` if the provider can perform `action` on a VM.
    ///
    /// Only the optional state changes are gated; termination and the volume
    /// actions are always available.
    pub const fn supports(&self, action: Action) -> bool {
        match action {
            Action::Pause | Action::Unpause => self.pause,
            Action::Start | Action::Stop => self.start_stop,
            Action::Suspend | Action::Resume => self.suspend,
            Action::Terminate | Action::Detach { .. } | Action::Delete => true,
        }
    }
}

/// Image capabilities reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImageCapabilities {
    /// Volume-backed images can be launched.
    pub volume_backed: bool,
    /// Images can be captured from a VM.
    pub capture: bool,
}

/// Volume capabilities reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VolumeCapabilities {
    /// Volume size is fixed by the product.
    pub size_from_product: bool,
    /// Smallest volume the provider creates, in gigabytes.
    pub minimum_size_gb: u32,
    pub vlan: Requirement,
    pub snapshots: bool,
}

/// Everything [`CloudProvider::capabilities`](crate::CloudProvider::capabilities) reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Capabilities {
    pub compute: ComputeCapabilities,
    pub image: ImageCapabilities,
    pub volume: VolumeCapabilities,
}

/// A state-changing or destructive provider action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Action {
    Start,
    Stop,
    Pause,
    Unpause,
    Suspend,
    Resume,
    Terminate,
    Detach { force: bool },
    Delete,
}

impl Action {
    /// Returns `true` for actions that destroy the resource.
    pub const fn is_destructive(&self) -> bool {
        matches!(self, Self::Terminate | Self::Delete)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
            Self::Pause => write!(f, "pause"),
            Self::Unpause => write!(f, "unpause"),
            Self::Suspend => write!(f, "suspend"),
            Self::Resume => write!(f, "resume"),
            Self::Terminate => write!(f, "terminate"),
            Self::Detach { force: true } => write!(f, "detach(force)"),
            Self::Detach { force: false } => write!(f, "detach"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

// =============================================================================
// Creation Requests
// =============================================================================

/// Parameters for launching a virtual machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmLaunch {
    pub name: String,
    pub data_center: String,
    pub product_id: String,
    pub image_id: String,
    pub platform: Platform,
    pub network_id: Option<String>,
    pub keypair_id: Option<String>,
    pub static_ip_id: Option<String>,
    pub root_volume_product_id: Option<String>,
    pub password: Option<String>,
}

/// Parameters for capturing an image from a VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCapture {
    pub name: String,
    pub vm_id: String,
}

/// Parameters for creating a volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeCreate {
    pub name: String,
    pub data_center: String,
    pub product_id: Option<String>,
    pub size_gb: Option<u32>,
    pub network_id: Option<String>,
}

/// Parameters for snapshotting a volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotCreate {
    pub name: String,
    pub volume_id: String,
}

/// Parameters for creating a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkCreate {
    pub name: String,
    pub data_center: String,
    pub cidr: String,
}

/// Parameters for creating a shell keypair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeypairCreate {
    pub name: String,
}

/// Parameters for reserving a static IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIpRequest {
    pub name: String,
    pub data_center: String,
}

/// A kind-specific creation request handed to
/// [`CreateResource::create`](crate::CreateResource::create).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateRequest {
    Vm(VmLaunch),
    Image(ImageCapture),
    Volume(VolumeCreate),
    Snapshot(SnapshotCreate),
    Network(NetworkCreate),
    Keypair(KeypairCreate),
    StaticIp(StaticIpRequest),
}

impl CreateRequest {
    /// Returns the kind of resource this request creates.
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Vm(_) => ResourceKind::Vm,
            Self::Image(_) => ResourceKind::Image,
            Self::Volume(_) => ResourceKind::Volume,
            Self::Snapshot(_) => ResourceKind::Snapshot,
            Self::Network(_) => ResourceKind::Network,
            Self::Keypair(_) => ResourceKind::Keypair,
            Self::StaticIp(_) => ResourceKind::StaticIp,
        }
    }

    /// Returns the name the resource will be created with.
    pub fn name(&self) -> &str {
        match self {
            Self::Vm(r) => &r.name,
            Self::Image(r) => &r.name,
            Self::Volume(r) => &r.name,
            Self::Snapshot(r) => &r.name,
            Self::Network(r) => &r.name,
            Self::Keypair(r) => &r.name,
            Self::StaticIp(r) => &r.name,
        }
    }
}

//! Deterministic "smallest reasonable" selection rules.
//!
//! These rules decide which product, volume product and data center every
//! fixture is created with. They are heuristics, not true minimums, and
//! ties always go to the candidate seen first.

use crate::types::{DataCenter, ImageState, MachineImage, VmProduct, VolumeProduct};

/// A smaller product is only accepted if it keeps at least this much RAM.
pub const PRODUCT_RAM_FLOOR_MB: u32 = 1000;

/// Smallest product-determined volume size worth using.
pub const VOLUME_SIZE_FLOOR_GB: u32 = 20;

/// Picks the default VM product from a listing.
///
/// Walking the list in order, a candidate replaces the current pick when:
///
/// 1. it has less RAM and still at least [`PRODUCT_RAM_FLOOR_MB`], or
/// 2. the current pick is below the floor and the candidate has no less RAM, or
/// 3. it has fewer CPUs and at least half the current pick's RAM.
pub fn select_product(products: &[VmProduct]) -> Option<&VmProduct> {
    let mut products = products.iter();
    let mut current = products.next()?;

    for candidate in products {
        let replace = if candidate.ram_mb < current.ram_mb {
            candidate.ram_mb >= PRODUCT_RAM_FLOOR_MB
        } else if current.ram_mb < PRODUCT_RAM_FLOOR_MB {
            true
        } else {
            lower_cpu_with_half_ram(candidate, current)
        };

        if replace {
            current = candidate;
        }
    }

    Some(current)
}

fn lower_cpu_with_half_ram(candidate: &VmProduct, current: &VmProduct) -> bool {
    candidate.cpu_count < current.cpu_count
        && u64::from(candidate.ram_mb) * 2 >= u64::from(current.ram_mb)
}

/// Picks the default volume product from a listing.
///
/// When the product fixes the size, the smallest size of at least
/// [`VOLUME_SIZE_FLOOR_GB`] wins. Otherwise the lowest positive monthly
/// per-gigabyte cost wins. If nothing qualifies the first product is kept.
pub fn select_volume_product(
    products: &[VolumeProduct],
    size_from_product: bool,
) -> Option<&VolumeProduct> {
    let mut products = products.iter();
    let mut current = products.next()?;

    for candidate in products {
        let replace = if size_from_product {
            let size = candidate.size_gb.unwrap_or(0);
            let current_size = current.size_gb.unwrap_or(0);
            size >= VOLUME_SIZE_FLOOR_GB
                && (current_size < VOLUME_SIZE_FLOOR_GB || size < current_size)
        } else {
            match (positive_cost(candidate), positive_cost(current)) {
                (Some(cost), Some(current_cost)) => cost < current_cost,
                (Some(_), None) => true,
                (None, _) => false,
            }
        };

        if replace {
            current = candidate;
        }
    }

    Some(current)
}

fn positive_cost(product: &VolumeProduct) -> Option<f64> {
    product.monthly_gb_cost.filter(|cost| *cost > 0.0)
}

/// Picks the first data center that is both active and available, falling
/// back to the first one listed.
pub fn select_data_center(data_centers: &[DataCenter]) -> Option<&DataCenter> {
    data_centers
        .iter()
        .find(|dc| dc.active && dc.available)
        .or_else(|| data_centers.first())
}

/// Returns `true` for an active image with no bundled software.
pub fn is_bare_image(image: &MachineImage) -> bool {
    image.state == ImageState::Active && image.software.is_empty()
}

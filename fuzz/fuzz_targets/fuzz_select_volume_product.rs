#![no_main]

use arbitrary::Arbitrary;
use cloudfixtures::defaults::select::{select_volume_product, VOLUME_SIZE_FLOOR_GB};
use cloudfixtures::types::VolumeProduct;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    size_from_product: bool,
    products: Vec<(Option<u32>, Option<f64>)>,
}

fuzz_target!(|input: Input| {
    let products: Vec<VolumeProduct> = input
        .products
        .iter()
        .enumerate()
        .map(|(i, (size_gb, monthly_gb_cost))| VolumeProduct {
            id: i.to_string(),
            name: String::new(),
            size_gb: *size_gb,
            monthly_gb_cost: *monthly_gb_cost,
        })
        .collect();

    let Some(chosen) = select_volume_product(&products, input.size_from_product) else {
        assert!(products.is_empty());
        return;
    };

    if input.size_from_product {
        // Once anything reaches the floor, the choice does too
        if products
            .iter()
            .any(|p| p.size_gb.unwrap_or(0) >= VOLUME_SIZE_FLOOR_GB)
        {
            assert!(chosen.size_gb.unwrap_or(0) >= VOLUME_SIZE_FLOOR_GB);
        }
    } else if products
        .iter()
        .any(|p| p.monthly_gb_cost.unwrap_or(0.0) > 0.0)
    {
        // Unpriced, free and NaN-priced products lose to any positive price
        assert!(chosen.monthly_gb_cost.unwrap_or(0.0) > 0.0);
    }
});

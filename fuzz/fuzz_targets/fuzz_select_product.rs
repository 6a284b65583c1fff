#![no_main]

use arbitrary::Arbitrary;
use cloudfixtures::defaults::select::{select_product, PRODUCT_RAM_FLOOR_MB};
use cloudfixtures::types::VmProduct;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Product {
    ram_mb: u32,
    cpu_count: u32,
}

fuzz_target!(|input: Vec<Product>| {
    let products: Vec<VmProduct> = input
        .iter()
        .enumerate()
        .map(|(i, p)| VmProduct {
            id: i.to_string(),
            name: String::new(),
            ram_mb: p.ram_mb,
            cpu_count: p.cpu_count,
        })
        .collect();

    let Some(chosen) = select_product(&products) else {
        assert!(products.is_empty());
        return;
    };

    // The choice is always one of the listed products
    assert!(products.iter().any(|p| std::ptr::eq(p, chosen)));

    // Without a CPU trade-off, a first product at or above the floor is
    // never traded for one below it
    if products[0].ram_mb >= PRODUCT_RAM_FLOOR_MB
        && products.iter().all(|p| p.cpu_count == products[0].cpu_count)
    {
        assert!(chosen.ram_mb >= PRODUCT_RAM_FLOOR_MB);
    }
});

//! Default selection tests against the fake provider.

use crate::common::{data_center, image, product, provisioner, volume_product, FakeCloud};

use cloudfixtures::types::{Architecture, ImageCatalog, ImageType, Platform, ResourceKind};
use cloudfixtures::{DefaultImage, FixtureRequest, ProvisioningFailure};

#[tokio::test(start_paused = true)]
async fn test_undersized_product_is_replaced() {
    let mut cloud = FakeCloud::new();
    cloud.products = vec![
        (Architecture::I64, product("tiny", 512, 1)),
        (Architecture::I64, product("large", 2048, 2)),
        (Architecture::I64, product("small", 1024, 1)),
    ];
    let fixtures = provisioner(cloud);

    let defaults = fixtures.defaults().await;
    assert_eq!(defaults.products, [(Architecture::I64, "small".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_defaults_snapshot() {
    let fixtures = provisioner(FakeCloud::new());
    let defaults = fixtures.defaults().await;

    assert_eq!(defaults.data_center.as_deref(), Some("zone-a"));
    assert_eq!(
        defaults.image,
        Some(DefaultImage {
            id: "img-ubuntu".to_string(),
            platform: Platform::Ubuntu,
            architecture: Architecture::I64,
        })
    );
    assert_eq!(defaults.volume_product.as_deref(), Some("standard"));
}

#[tokio::test(start_paused = true)]
async fn test_defaults_are_computed_once() {
    let fixtures = provisioner(FakeCloud::new());
    let first = fixtures.defaults().await;
    let queries = fixtures.provider().queries();

    let second = fixtures.defaults().await;
    fixtures
        .ensure(&FixtureRequest::new(ResourceKind::Vm, "dsnvm"))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(fixtures.provider().queries(), queries);
}

#[tokio::test(start_paused = true)]
async fn test_private_catalog_searched_first() {
    let mut cloud = FakeCloud::new();
    cloud.images = vec![
        (
            ImageCatalog::Public,
            image("public", Architecture::I64, Platform::Ubuntu, ImageType::Storage),
        ),
        (
            ImageCatalog::Private,
            image("private", Architecture::I64, Platform::Ubuntu, ImageType::Storage),
        ),
    ];
    let fixtures = provisioner(cloud);

    let defaults = fixtures.defaults().await;
    assert_eq!(defaults.image.unwrap().id, "private");
}

#[tokio::test(start_paused = true)]
async fn test_architecture_searched_before_platform() {
    let mut cloud = FakeCloud::new();
    cloud.images = vec![
        (
            ImageCatalog::Public,
            image("ubuntu-power", Architecture::Power, Platform::Ubuntu, ImageType::Storage),
        ),
        (
            ImageCatalog::Public,
            image("centos-64", Architecture::I64, Platform::CentOs, ImageType::Storage),
        ),
    ];
    cloud.products.push((Architecture::Power, product("p1", 2048, 2)));
    let fixtures = provisioner(cloud);

    let defaults = fixtures.defaults().await;
    let image = defaults.image.unwrap();
    assert_eq!(image.id, "centos-64");
    assert_eq!(image.platform, Platform::CentOs);
    // Only the image's architecture gets a product.
    assert_eq!(defaults.products, [(Architecture::I64, "m1.small".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_image_with_bundled_software_is_skipped() {
    let mut bundled = image("sql", Architecture::I64, Platform::Ubuntu, ImageType::Storage);
    bundled.software = "SQL Server".to_string();

    let mut cloud = FakeCloud::new();
    cloud.images = vec![
        (ImageCatalog::Private, bundled),
        (
            ImageCatalog::Public,
            image("bare", Architecture::I64, Platform::Ubuntu, ImageType::Storage),
        ),
    ];
    let fixtures = provisioner(cloud);

    assert_eq!(fixtures.defaults().await.image.unwrap().id, "bare");
}

#[tokio::test(start_paused = true)]
async fn test_volume_backed_image_preferred_when_supported() {
    let mut cloud = FakeCloud::new();
    cloud.capabilities.image.volume_backed = true;
    cloud.images = vec![
        (
            ImageCatalog::Public,
            image("storage", Architecture::I64, Platform::Ubuntu, ImageType::Storage),
        ),
        (
            ImageCatalog::Public,
            image("volume", Architecture::I64, Platform::Ubuntu, ImageType::Volume),
        ),
    ];
    let fixtures = provisioner(cloud);

    assert_eq!(fixtures.defaults().await.image.unwrap().id, "volume");
}

#[tokio::test(start_paused = true)]
async fn test_volume_backed_image_ignored_when_unsupported() {
    let mut cloud = FakeCloud::new();
    cloud.images = vec![(
        ImageCatalog::Public,
        image("volume", Architecture::I64, Platform::Ubuntu, ImageType::Volume),
    )];
    let fixtures = provisioner(cloud);

    assert_eq!(fixtures.defaults().await.image, None);
}

#[tokio::test(start_paused = true)]
async fn test_data_center_prefers_active_and_available() {
    let mut cloud = FakeCloud::new();
    cloud.data_centers = vec![
        data_center("zone-a", false, true),
        data_center("zone-b", true, false),
        data_center("zone-c", true, true),
    ];
    let fixtures = provisioner(cloud);

    assert_eq!(fixtures.defaults().await.data_center.as_deref(), Some("zone-c"));
}

#[tokio::test(start_paused = true)]
async fn test_data_center_falls_back_to_first() {
    let mut cloud = FakeCloud::new();
    cloud.data_centers = vec![
        data_center("zone-a", false, false),
        data_center("zone-b", true, false),
    ];
    let fixtures = provisioner(cloud);

    assert_eq!(fixtures.defaults().await.data_center.as_deref(), Some("zone-a"));
}

#[tokio::test(start_paused = true)]
async fn test_volume_product_by_size() {
    let mut cloud = FakeCloud::new();
    cloud.capabilities.volume.size_from_product = true;
    cloud.volume_products = vec![
        volume_product("vol-5", Some(5), None),
        volume_product("vol-100", Some(100), None),
        volume_product("vol-40", Some(40), None),
    ];
    let fixtures = provisioner(cloud);

    let defaults = fixtures.defaults().await;
    assert_eq!(defaults.volume_product.as_deref(), Some("vol-40"));
}

#[tokio::test(start_paused = true)]
async fn test_volume_product_by_cost() {
    let mut cloud = FakeCloud::new();
    cloud.volume_products = vec![
        volume_product("free", None, Some(0.0)),
        volume_product("premium", None, Some(0.2)),
        volume_product("standard", None, Some(0.1)),
    ];
    let fixtures = provisioner(cloud);

    let defaults = fixtures.defaults().await;
    assert_eq!(defaults.volume_product.as_deref(), Some("standard"));
}

#[tokio::test(start_paused = true)]
async fn test_no_products_means_no_default() {
    let mut cloud = FakeCloud::new();
    cloud.products.clear();
    let fixtures = provisioner(cloud);

    assert!(fixtures.defaults().await.products.is_empty());

    let err = fixtures
        .ensure(&FixtureRequest::new(ResourceKind::Vm, "dsnvm"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningFailure::NoDefault { what: "product", .. }));
    assert!(fixtures.provider().creates().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_product_sized_volume_without_products_is_unsupported() {
    let mut cloud = FakeCloud::new();
    cloud.capabilities.volume.size_from_product = true;
    cloud.volume_products.clear();
    let fixtures = provisioner(cloud);

    let err = fixtures
        .ensure(&FixtureRequest::new(ResourceKind::Volume, "data"))
        .await
        .unwrap_err();
    assert!(err.is_unsupported());
}

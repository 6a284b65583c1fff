//! Run-wide defaults: data center, VM products, image and volume product.
//!
//! Each default is computed the first time it is needed by probing the
//! provider, then cached for the rest of the run and never invalidated.
//! A default that cannot be computed is cached as absent: clouds without
//! the capability simply have no default, and provisioning that needs it
//! reports the fixture as unsupported.

pub mod select;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::best_effort;
use crate::types::{
    Architecture, Capabilities, ImageCatalog, ImageFilter, ImageType, Platform,
};
use crate::CloudProvider;

/// The image fixtures are launched from.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DefaultImage {
    pub id: String,
    pub platform: Platform,
    pub architecture: Architecture,
}

/// Read-only copy of the defaults computed so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DefaultsSnapshot {
    pub data_center: Option<String>,
    pub image: Option<DefaultImage>,
    pub volume_product: Option<String>,
    /// Default product per architecture, for architectures probed so far.
    pub products: Vec<(Architecture, String)>,
}

/// Lazily computed, run-wide defaults.
#[derive(Debug, Default)]
pub struct Defaults {
    data_center: OnceCell<Option<String>>,
    image: OnceCell<Option<DefaultImage>>,
    volume_product: OnceCell<Option<String>>,
    products: Mutex<HashMap<Architecture, Arc<OnceCell<Option<String>>>>>,
}

impl Defaults {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the default data center.
    pub async fn data_center<P: CloudProvider>(&self, provider: &P) -> Option<String> {
        self.data_center
            .get_or_init(|| async {
                let listed = provider.list_data_centers().await;
                let data_centers = best_effort(format_args!("list data centers"), listed)?;
                let chosen = select::select_data_center(&data_centers)?;
                log::info!("default data center: {}", chosen.id);
                Some(chosen.id.clone())
            })
            .await
            .clone()
    }

    /// Returns the default VM product for an architecture.
    pub async fn product<P: CloudProvider>(
        &self,
        provider: &P,
        architecture: Architecture,
    ) -> Option<String> {
        let cell = Arc::clone(self.products.lock().entry(architecture).or_default());

        cell.get_or_init(|| async {
            let listed = provider.list_products(architecture).await;
            let products =
                best_effort(format_args!("list {architecture} products"), listed)?;
            let chosen = select::select_product(&products)?;
            log::info!(
                "default {architecture} product: {} ({} MB, {} CPU)",
                chosen.id,
                chosen.ram_mb,
                chosen.cpu_count
            );
            Some(chosen.id.clone())
        })
        .await
        .clone()
    }

    /// Returns the default image.
    ///
    /// Architectures and platforms are searched in their fixed order; within
    /// each, volume-backed images are preferred when the cloud supports them,
    /// and the private catalog is searched before the public one. The first
    /// active image without bundled software wins.
    pub async fn image<P: CloudProvider>(
        &self,
        provider: &P,
        capabilities: &Capabilities,
    ) -> Option<DefaultImage> {
        let image_types: &[ImageType] = if capabilities.image.volume_backed {
            &[ImageType::Volume, ImageType::Storage]
        } else {
            &[ImageType::Storage]
        };

        self.image
            .get_or_init(|| async {
                let image = find_image(provider, image_types).await;
                match &image {
                    Some(image) => log::info!(
                        "default image: {} ({} {})",
                        image.id,
                        image.platform,
                        image.architecture
                    ),
                    None => log::warn!("no bare OS image found in any catalog"),
                }
                image
            })
            .await
            .clone()
    }

    /// Returns the default volume product.
    pub async fn volume_product<P: CloudProvider>(
        &self,
        provider: &P,
        capabilities: &Capabilities,
    ) -> Option<String> {
        let size_from_product = capabilities.volume.size_from_product;

        self.volume_product
            .get_or_init(|| async {
                let listed = provider.list_volume_products().await;
                let products = best_effort(format_args!("list volume products"), listed)?;
                let chosen = select::select_volume_product(&products, size_from_product)?;
                log::info!("default volume product: {}", chosen.id);
                Some(chosen.id.clone())
            })
            .await
            .clone()
    }

    /// Returns what has been computed so far without probing the provider.
    pub fn snapshot(&self) -> DefaultsSnapshot {
        let mut products: Vec<_> = self
            .products
            .lock()
            .iter()
            .filter_map(|(arch, cell)| cell.get().cloned().flatten().map(|id| (*arch, id)))
            .collect();
        products.sort_by_key(|(arch, _)| {
            Architecture::SEARCH_ORDER
                .iter()
                .position(|candidate| candidate == arch)
        });

        DefaultsSnapshot {
            data_center: self.data_center.get().cloned().flatten(),
            image: self.image.get().cloned().flatten(),
            volume_product: self.volume_product.get().cloned().flatten(),
            products,
        }
    }
}

async fn find_image<P: CloudProvider>(
    provider: &P,
    image_types: &[ImageType],
) -> Option<DefaultImage> {
    for architecture in Architecture::SEARCH_ORDER {
        for platform in Platform::SEARCH_ORDER {
            for &image_type in image_types {
                let filter = ImageFilter {
                    architecture,
                    platform,
                    image_type,
                };
                for catalog in [ImageCatalog::Private, ImageCatalog::Public] {
                    let listed = provider.list_images(catalog, &filter).await;
                    let Some(images) = best_effort(
                        format_args!("list {catalog:?} {platform} {architecture} images"),
                        listed,
                    ) else {
                        continue;
                    };

                    if let Some(image) = images.iter().find(|image| select::is_bare_image(image)) {
                        return Some(DefaultImage {
                            id: image.id.clone(),
                            platform: image.platform,
                            architecture: image.architecture,
                        });
                    }
                }
            }
        }
    }
    None
}

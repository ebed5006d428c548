use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use volante_core::error::{Error, Result};
use volante_core::models::Driver;
use volante_core::store::{EntityStore, FileStore, Predicate, Repository};

/// Driver registration form. Photos are raw bytes handed to the upload
/// collaborator; only the resulting urls are persisted.
#[derive(Debug, Clone)]
pub struct NewDriver {
    pub full_name: String,
    pub city: String,
    pub cnh_category: String,
    pub cnh_expiry: NaiveDate,
    pub cnh_photo: Option<PhotoUpload>,
    pub profile_photo: Option<PhotoUpload>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Registration and profile maintenance for the driver pool. New drivers
/// start unavailable and unverified; an operator flips `is_verified` after
/// reviewing the CNH photo.
pub struct DriverRegistry {
    drivers: Repository<Driver>,
    files: Arc<dyn FileStore>,
}

impl DriverRegistry {
    pub fn new(store: Arc<dyn EntityStore>, files: Arc<dyn FileStore>) -> Self {
        DriverRegistry {
            drivers: Repository::new(store),
            files,
        }
    }

    pub async fn register(&self, owner: &str, form: NewDriver) -> Result<Driver> {
        if form.full_name.trim().is_empty() {
            return Err(Error::validation("full_name", "full name is required"));
        }
        if form.city.trim().is_empty() {
            return Err(Error::validation("city", "city is required"));
        }
        if form.cnh_category.trim().is_empty() {
            return Err(Error::validation("cnh_category", "CNH category is required"));
        }
        if form.cnh_expiry <= Utc::now().date_naive() {
            return Err(Error::validation("cnh_expiry", "CNH has expired"));
        }

        let cnh_photo = self.upload(form.cnh_photo).await?;
        let profile_photo = self.upload(form.profile_photo).await?;

        let now = Utc::now();
        let driver = Driver {
            id: Uuid::new_v4(),
            created_by: owner.to_string(),
            full_name: form.full_name.trim().to_string(),
            city: form.city.trim().to_string(),
            cnh_category: form.cnh_category.trim().to_string(),
            cnh_expiry: form.cnh_expiry,
            cnh_photo,
            profile_photo,
            lat: form.lat,
            lng: form.lng,
            rating: 5.0,
            total_rides: 0,
            is_available: false,
            is_verified: false,
            created_date: now,
            updated_date: now,
        };
        self.drivers.create(&driver).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Driver> {
        self.drivers.get(id).await
    }

    pub async fn list(&self) -> Result<Vec<Driver>> {
        self.drivers.all().await
    }

    pub async fn find_by_owner(&self, owner: &str) -> Result<Option<Driver>> {
        let predicate = Predicate::default().field("created_by", owner);
        self.drivers.find_one(&predicate).await
    }

    pub async fn set_availability(&self, id: Uuid, available: bool) -> Result<Driver> {
        let mut driver = self.drivers.get(id).await?;
        driver.is_available = available;
        self.drivers.update(&driver).await
    }

    pub async fn set_verified(&self, id: Uuid, verified: bool) -> Result<Driver> {
        let mut driver = self.drivers.get(id).await?;
        driver.is_verified = verified;
        self.drivers.update(&driver).await
    }

    pub async fn update_position(&self, id: Uuid, lat: f64, lng: f64) -> Result<Driver> {
        let mut driver = self.drivers.get(id).await?;
        driver.lat = Some(lat);
        driver.lng = Some(lng);
        self.drivers.update(&driver).await
    }

    async fn upload(&self, photo: Option<PhotoUpload>) -> Result<Option<String>> {
        match photo {
            Some(photo) => {
                let stored = self.files.upload(&photo.filename, photo.bytes).await?;
                Ok(Some(stored.url))
            }
            None => Ok(None),
        }
    }
}

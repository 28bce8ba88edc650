//! Nearby clinic recommendations from a static JSON directory.

use cyclecare_core::{AppConfig, AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Clinics returned when the caller does not ask for a specific number.
pub const DEFAULT_CLINIC_LIMIT: usize = 3;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Straight-line distance in kilometres (equirectangular projection,
    /// accurate at city scale).
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let mean_lat = ((self.latitude + other.latitude) / 2.0).to_radians();
        let x = (other.longitude - self.longitude).to_radians() * mean_lat.cos();
        let y = (other.latitude - self.latitude).to_radians();
        EARTH_RADIUS_KM * (x * x + y * y).sqrt()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clinic {
    pub name: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub specialties: Vec<String>,
    pub coordinates: GeoPoint,
}

/// A clinic with its distance from the requested location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClinicMatch {
    #[serde(flatten)]
    pub clinic: Clinic,
    pub distance_km: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ClinicFile {
    List(Vec<Clinic>),
    Wrapped { clinics: Vec<Clinic> },
}

#[derive(Debug, Clone, Default)]
pub struct ClinicDirectory {
    clinics: Vec<Clinic>,
}

impl ClinicDirectory {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(clinics: Vec<Clinic>) -> Self {
        Self { clinics }
    }

    /// Parse a clinic file: either a JSON array or `{"clinics": [...]}`.
    pub fn load(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let file: ClinicFile = serde_json::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Invalid clinic file {:?}: {}", path, e))
        })?;
        let clinics = match file {
            ClinicFile::List(clinics) | ClinicFile::Wrapped { clinics } => clinics,
        };
        tracing::debug!(count = clinics.len(), "Loaded clinic directory");
        Ok(Self { clinics })
    }

    /// The configured clinic file, or an empty directory when none is
    /// configured or the file does not exist.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        match config.clinics_file() {
            Some(path) if path.exists() => Self::load(&path),
            Some(path) => {
                tracing::warn!("Clinic file {:?} not found; no clinics will be recommended", path);
                Ok(Self::empty())
            }
            None => Ok(Self::empty()),
        }
    }

    pub fn len(&self) -> usize {
        self.clinics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clinics.is_empty()
    }

    /// Up to `limit` clinics nearest to `location`, closest first. Never
    /// fails: an invalid location or empty directory yields no clinics.
    pub fn recommend(&self, location: GeoPoint, limit: usize) -> Vec<ClinicMatch> {
        if !location.is_valid() {
            tracing::warn!(?location, "Ignoring clinic request with invalid coordinates");
            return Vec::new();
        }

        let mut matches: Vec<ClinicMatch> = self
            .clinics
            .iter()
            .filter(|clinic| clinic.coordinates.is_valid())
            .map(|clinic| ClinicMatch {
                distance_km: location.distance_km(&clinic.coordinates),
                clinic: clinic.clone(),
            })
            .collect();

        matches.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        matches.truncate(limit);
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"[
        {
            "name": "Women's Health Centre",
            "address": "No. 55, Sec. 5, Zhongxiao E. Rd., Xinyi Dist., Taipei",
            "phone": "02-12345678",
            "specialties": ["gynaecology", "menstrual problems", "endocrinology"],
            "coordinates": {"latitude": 25.041171, "longitude": 121.565227}
        },
        {
            "name": "Moon Clinic",
            "address": "No. 233, Sec. 1, Dunhua S. Rd., Da'an Dist., Taipei",
            "phone": "02-87654321",
            "specialties": ["gynaecology", "adolescent care", "period pain"],
            "coordinates": {"latitude": 25.036398, "longitude": 121.551830}
        },
        {
            "name": "Banqiao Women's Medical Centre",
            "address": "No. 66, Minquan Rd., Banqiao Dist., New Taipei",
            "specialties": ["gynaecology", "fertility"],
            "coordinates": {"latitude": 25.013473, "longitude": 121.465102}
        }
    ]"#;

    fn sample_directory() -> ClinicDirectory {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clinics.json");
        std::fs::write(&path, SAMPLE).unwrap();
        ClinicDirectory::load(&path).unwrap()
    }

    #[test]
    fn test_nearest_first() {
        let directory = sample_directory();
        let user = GeoPoint::new(25.033671, 121.564427);

        let matches = directory.recommend(user, DEFAULT_CLINIC_LIMIT);
        let names: Vec<&str> = matches.iter().map(|m| m.clinic.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Women's Health Centre", "Moon Clinic", "Banqiao Women's Medical Centre"]
        );
        for pair in matches.windows(2) {
            assert!(pair[0].distance_km <= pair[1].distance_km);
        }
        assert!(matches[0].distance_km < 1.5);
    }

    #[test]
    fn test_limit() {
        let directory = sample_directory();
        let matches = directory.recommend(GeoPoint::new(25.01, 121.46), 1);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].clinic.name, "Banqiao Women's Medical Centre");
        assert!(directory.recommend(GeoPoint::new(25.01, 121.46), 0).is_empty());
    }

    #[test]
    fn test_wrapped_format_and_optional_phone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clinics.json");
        let wrapped = format!("{{\"clinics\": {}}}", SAMPLE);
        std::fs::write(&path, wrapped).unwrap();

        let directory = ClinicDirectory::load(&path).unwrap();
        assert_eq!(directory.len(), 3);
        let banqiao = directory.recommend(GeoPoint::new(25.013473, 121.465102), 1);
        assert_eq!(banqiao[0].clinic.phone, None);
        assert!(banqiao[0].distance_km < 0.001);
    }

    #[test]
    fn test_empty_and_invalid_location() {
        assert!(ClinicDirectory::empty()
            .recommend(GeoPoint::new(25.0, 121.5), 3)
            .is_empty());
        assert!(sample_directory()
            .recommend(GeoPoint::new(f64::NAN, 121.5), 3)
            .is_empty());
        assert!(sample_directory()
            .recommend(GeoPoint::new(95.0, 121.5), 3)
            .is_empty());
    }

    #[test]
    fn test_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clinics.json");
        std::fs::write(&path, "{\"clinics\": 3}").unwrap();
        assert!(matches!(
            ClinicDirectory::load(&path),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_from_config_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig {
            workspace: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(ClinicDirectory::from_config(&config).unwrap().is_empty());

        config.rag.clinics_file = Some("clinics.json".into());
        assert!(ClinicDirectory::from_config(&config).unwrap().is_empty());

        std::fs::write(dir.path().join("clinics.json"), SAMPLE).unwrap();
        assert_eq!(ClinicDirectory::from_config(&config).unwrap().len(), 3);
    }
}

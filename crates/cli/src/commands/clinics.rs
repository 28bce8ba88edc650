//! Clinics command handler.

use super::print_json;
use clap::Args;
use cyclecare_core::config::AppConfig;
use cyclecare_knowledge::{ClinicDirectory, GeoPoint, DEFAULT_CLINIC_LIMIT};

/// Recommend clinics near a location
#[derive(Args, Debug)]
pub struct ClinicsCommand {
    /// Latitude in decimal degrees
    #[arg(long, allow_negative_numbers = true)]
    pub lat: f64,

    /// Longitude in decimal degrees
    #[arg(long, allow_negative_numbers = true)]
    pub lon: f64,

    /// Maximum number of clinics to list
    #[arg(long, default_value_t = DEFAULT_CLINIC_LIMIT)]
    pub limit: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ClinicsCommand {
    pub fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        let location = GeoPoint::new(self.lat, self.lon);
        if !location.is_valid() {
            anyhow::bail!("invalid coordinates: {}, {}", self.lat, self.lon);
        }

        let directory = ClinicDirectory::from_config(config)?;
        let matches = directory.recommend(location, self.limit);

        if self.json {
            return print_json(&matches);
        }

        if matches.is_empty() {
            println!("No clinics available. Set rag.clinicsFile to a clinic list.");
            return Ok(());
        }

        for (rank, found) in matches.iter().enumerate() {
            println!("{}. {} ({:.1} km)", rank + 1, found.clinic.name, found.distance_km);
            println!("   {}", found.clinic.address);
            if let Some(phone) = &found.clinic.phone {
                println!("   Tel: {}", phone);
            }
            if !found.clinic.specialties.is_empty() {
                println!("   Specialties: {}", found.clinic.specialties.join(", "));
            }
        }

        Ok(())
    }
}

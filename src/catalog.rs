use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Read;
use strum_macros::Display;

/// Compact string type used for registry ids and geography keys.
pub type KeyString = smartstring::alias::String;

/// Year a unit without a decommissioning date is treated as decommissioned in,
/// i.e. never within any simulated horizon.
pub const OPEN_END_DECOMMISSIONING_YEAR: i32 = 9999;
/// Commissioning-year bucket for units without a commissioning date.
pub const UNKNOWN_COMMISSIONING_YEAR: i32 = -1;

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Technology {
    Wind,
    Solar,
}

/// Technology-specific attributes as mapped by the upstream registry ETL.
///
/// The azimuth/tilt pair is always present for solar units (the ETL maps
/// unknown registry values to documented defaults and notes that on the
/// unit's mapping log); the turbine type may still be unmapped and is then
/// substituted with the run's default type at power-curve lookup.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "lowercase", tag = "technology")]
pub enum TechnologyAttributes {
    Wind {
        turbine_type: Option<String>,
        hub_height_m: f64,
    },
    Solar {
        azimuth_deg: f64,
        tilt_deg: f64,
    },
}

impl TechnologyAttributes {
    pub fn technology(&self) -> Technology {
        match self {
            TechnologyAttributes::Wind { .. } => Technology::Wind,
            TechnologyAttributes::Solar { .. } => Technology::Solar,
        }
    }
}

/// One energy unit from the national registry, as prepared by the external
/// mapping/ETL stage. Read-only to this crate.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EnergyUnit {
    pub id: KeyString,
    /// Rated net capacity, in kW.
    pub net_capacity_kw: f64,
    /// Raw registry coordinates (may be absent).
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Nearest weather-grid-point coordinates assigned by the ETL.
    pub grid_latitude: Option<f64>,
    pub grid_longitude: Option<f64>,
    /// Municipality key and centroid.
    pub municipality_key: Option<String>,
    pub municipality_latitude: Option<f64>,
    pub municipality_longitude: Option<f64>,
    /// Postal code and centroid.
    pub postal_code: Option<String>,
    pub postal_latitude: Option<f64>,
    pub postal_longitude: Option<f64>,
    pub state: Option<String>,
    pub commissioning_date: Option<NaiveDate>,
    pub decommissioning_date: Option<NaiveDate>,
    pub attributes: TechnologyAttributes,
    /// Append-only textual log of mapping substitutions applied to this unit.
    #[serde(default)]
    pub mapping_log: String,
}

impl EnergyUnit {
    pub fn technology(&self) -> Technology {
        self.attributes.technology()
    }

    pub fn commissioning_year(&self) -> i32 {
        self.commissioning_date
            .map(|date| date.year())
            .unwrap_or(UNKNOWN_COMMISSIONING_YEAR)
    }

    pub fn decommissioning_year(&self) -> i32 {
        self.decommissioning_date
            .map(|date| date.year())
            .unwrap_or(OPEN_END_DECOMMISSIONING_YEAR)
    }

    /// Whether the unit was operationally active in the given calendar year.
    /// Commissioning is inclusive, decommissioning exclusive (a unit
    /// decommissioned during a year no longer counts as running that year).
    pub fn is_running_in(&self, year: i32) -> bool {
        self.commissioning_year() <= year && year < self.decommissioning_year()
    }

    pub fn push_mapping_note(&mut self, note: &str) {
        if !self.mapping_log.is_empty() {
            self.mapping_log.push_str("; ");
        }
        self.mapping_log.push_str(note);
    }
}

/// Explicit listing filter; every restriction the caller wants is a
/// parameter here, nothing is read from ambient state.
#[derive(Clone, Debug, Default)]
pub struct UnitFilter {
    /// Restrict to these registry ids.
    pub ids: Option<Vec<KeyString>>,
    /// Cap the number of returned units (applied last).
    pub limit: Option<usize>,
    /// Anti-join set for incremental runs: units in this set are skipped
    /// because they already have a yearly result for the simulation year.
    pub exclude_ids: Option<HashSet<KeyString>>,
}

impl UnitFilter {
    fn matches(&self, unit: &EnergyUnit) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&unit.id) {
                return false;
            }
        }
        if let Some(excluded) = &self.exclude_ids {
            if excluded.contains(&unit.id) {
                return false;
            }
        }
        true
    }
}

pub trait UnitCatalog: Send + Sync {
    /// List the units of one technology matching the filter, in catalog order.
    fn list_units(
        &self,
        technology: Technology,
        filter: &UnitFilter,
    ) -> anyhow::Result<Vec<EnergyUnit>>;
}

/// Catalog held fully in memory, loaded from the ETL's JSON unit dump.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCatalog {
    units: Vec<EnergyUnit>,
}

impl InMemoryCatalog {
    pub fn new(units: Vec<EnergyUnit>) -> Self {
        Self { units }
    }

    pub fn from_json(reader: impl Read) -> anyhow::Result<Self> {
        let units: Vec<EnergyUnit> = serde_json::from_reader(reader)?;
        Ok(Self::new(units))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl UnitCatalog for InMemoryCatalog {
    fn list_units(
        &self,
        technology: Technology,
        filter: &UnitFilter,
    ) -> anyhow::Result<Vec<EnergyUnit>> {
        let mut units = self
            .units
            .iter()
            .filter(|unit| unit.technology() == technology && filter.matches(unit))
            .cloned()
            .collect::<Vec<_>>();
        if let Some(limit) = filter.limit {
            units.truncate(limit);
        }
        Ok(units)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    pub(crate) fn wind_unit(id: &str) -> EnergyUnit {
        EnergyUnit {
            id: id.into(),
            net_capacity_kw: 2000.,
            latitude: Some(53.5),
            longitude: Some(8.1),
            grid_latitude: Some(53.5),
            grid_longitude: Some(8.0),
            municipality_key: Some("03403000".into()),
            municipality_latitude: Some(53.5),
            municipality_longitude: Some(8.1),
            postal_code: Some("26125".into()),
            postal_latitude: Some(53.5),
            postal_longitude: Some(8.1),
            state: Some("Niedersachsen".into()),
            commissioning_date: NaiveDate::from_ymd_opt(2019, 6, 1),
            decommissioning_date: None,
            attributes: TechnologyAttributes::Wind {
                turbine_type: Some("E-82/2300".into()),
                hub_height_m: 98.,
            },
            mapping_log: String::new(),
        }
    }

    #[fixture]
    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new(vec![wind_unit("W1"), wind_unit("W2"), wind_unit("W3")])
    }

    #[rstest]
    fn lists_only_matching_technology(catalog: InMemoryCatalog) {
        assert_eq!(
            catalog
                .list_units(Technology::Solar, &UnitFilter::default())
                .unwrap()
                .len(),
            0
        );
        assert_eq!(
            catalog
                .list_units(Technology::Wind, &UnitFilter::default())
                .unwrap()
                .len(),
            3
        );
    }

    #[rstest]
    fn id_filter_and_limit_apply_in_order(catalog: InMemoryCatalog) {
        let filter = UnitFilter {
            ids: Some(vec!["W1".into(), "W3".into()]),
            limit: Some(1),
            exclude_ids: None,
        };
        let units = catalog.list_units(Technology::Wind, &filter).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].id, "W1");
    }

    #[rstest]
    fn exclusion_set_models_the_incremental_anti_join(catalog: InMemoryCatalog) {
        let filter = UnitFilter {
            exclude_ids: Some(["W2".into()].into_iter().collect()),
            ..Default::default()
        };
        let units = catalog.list_units(Technology::Wind, &filter).unwrap();
        assert_eq!(
            units.iter().map(|unit| unit.id.as_str()).collect::<Vec<_>>(),
            vec!["W1", "W3"]
        );
    }

    #[rstest]
    fn lifecycle_years_fall_back_to_sentinels() {
        let mut unit = wind_unit("W1");
        assert_eq!(unit.commissioning_year(), 2019);
        assert_eq!(unit.decommissioning_year(), OPEN_END_DECOMMISSIONING_YEAR);
        unit.commissioning_date = None;
        assert_eq!(unit.commissioning_year(), UNKNOWN_COMMISSIONING_YEAR);
    }

    #[rstest]
    fn running_window_is_commission_inclusive_decommission_exclusive() {
        let mut unit = wind_unit("W1");
        unit.decommissioning_date = NaiveDate::from_ymd_opt(2022, 3, 1);
        assert!(!unit.is_running_in(2018));
        assert!(unit.is_running_in(2019));
        assert!(unit.is_running_in(2021));
        assert!(!unit.is_running_in(2022));
    }

    #[rstest]
    fn mapping_notes_append_with_separator() {
        let mut unit = wind_unit("W1");
        unit.push_mapping_note("turbine type defaulted");
        unit.push_mapping_note("hub height defaulted");
        assert_eq!(
            unit.mapping_log,
            "turbine type defaulted; hub height defaulted"
        );
    }
}

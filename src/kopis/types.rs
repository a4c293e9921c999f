//! XML payloads returned by the KOPIS performance endpoints.
//!
//! Both the list and the detail endpoint answer with a `<dbs>` root holding
//! zero or more `<db>` children. Deserializing the children into a `Vec`
//! means a lone `<db>` and a run of them come out the same way, and an empty
//! `<dbs/>` yields an empty sequence.

use serde::Deserialize;

use crate::record::{Detail, Listing};

/// The `<dbs>` root element.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "db", default = "Vec::new")]
    pub items: Vec<T>,
}

/// One `<db>` entry of the list endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawItem {
    #[serde(default)]
    pub mt20id: String,
    #[serde(default)]
    pub prfnm: String,
    #[serde(default)]
    pub prfpdfrom: String,
    #[serde(default)]
    pub prfpdto: String,
    #[serde(default)]
    pub fcltynm: String,
    #[serde(default)]
    pub poster: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub genrenm: Option<String>,
    #[serde(default)]
    pub prfstate: Option<String>,
}

impl RawItem {
    /// External id, or `None` when the upstream left it blank.
    pub fn external_id(&self) -> Option<&str> {
        let id = self.mt20id.trim();
        (!id.is_empty()).then_some(id)
    }

    pub fn to_listing(&self) -> Listing {
        Listing {
            name: self.prfnm.trim().to_string(),
            genre: non_empty(&self.genrenm),
            state_label: non_empty(&self.prfstate),
            start_date: self.prfpdfrom.trim().to_string(),
            end_date: self.prfpdto.trim().to_string(),
            venue_name: self.fcltynm.trim().to_string(),
            poster: non_empty(&self.poster),
            area: non_empty(&self.area),
        }
    }
}

/// One `<db>` entry of the detail endpoint. Only the enrichment fields are read.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawDetail {
    #[serde(default)]
    pub mt10id: Option<String>,
    #[serde(default)]
    pub pcseguidance: Option<String>,
    #[serde(default)]
    pub sty: Option<String>,
    #[serde(default, alias = "prfrunstime")]
    pub prfruntime: Option<String>,
}

impl RawDetail {
    pub fn facility_id(&self) -> Option<String> {
        non_empty(&self.mt10id)
    }

    pub fn to_detail(&self) -> Detail {
        Detail {
            facility_id: self.facility_id(),
            price_guidance: non_empty(&self.pcseguidance),
            synopsis: non_empty(&self.sty),
            runtime: non_empty(&self.prfruntime),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

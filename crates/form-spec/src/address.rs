//! Composed address field sets.
//!
//! An address is a group of plain fields under a common prefix, switched by
//! the `<prefix>.country` discriminator. The domestic subset walks the
//! administrative hierarchy and then splits on urban/rural; the international
//! subset is a flat list. The two subsets are attached with SHOW and HIDE
//! conditionals over the same discriminator, so they are never visible
//! together.

use crate::dsl::{and, field, not, or};
use crate::expr::Expr;
use crate::spec::{FieldConfig, FieldType, SelectOption};

pub const ADMIN_STRUCTURE: &str = "ADMIN_STRUCTURE";
pub const URBAN: &str = "URBAN";
pub const RURAL: &str = "RURAL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressConfig {
    /// Id prefix, e.g. `applicant.address`.
    pub prefix: String,
    pub domestic_country: String,
    pub countries: Vec<SelectOption>,
    /// Marks the country, the admin levels and the international state and
    /// district as required.
    pub required: bool,
}

impl AddressConfig {
    pub fn new(prefix: impl Into<String>, domestic_country: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            domestic_country: domestic_country.into(),
            countries: Vec::new(),
            required: false,
        }
    }

    pub fn countries(mut self, countries: Vec<SelectOption>) -> Self {
        self.countries = countries;
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    fn id(&self, part: &str) -> String {
        format!("{}.{part}", self.prefix)
    }

    pub fn country_id(&self) -> String {
        self.id("country")
    }
}

/// Field list for one address, in display order.
pub fn address_fields(config: &AddressConfig) -> Vec<FieldConfig> {
    let country = config.country_id();
    let is_domestic = || field(&country).is_equal_to(config.domestic_country.as_str());
    let urban_or_rural = config.id("urbanOrRural");
    let is_rural = || field(&urban_or_rural).is_equal_to(RURAL);

    let mut fields = vec![
        FieldConfig::new(&country, FieldType::Select)
            .label("Country")
            .required(config.required)
            .options(config.countries.clone())
            .default_value(config.domestic_country.as_str()),
    ];

    let province = config.id("province");
    let domestic = [
        FieldConfig::new(&province, FieldType::Location)
            .label("Province")
            .required(config.required)
            .located_in(ADMIN_STRUCTURE, None),
        FieldConfig::new(config.id("district"), FieldType::Location)
            .label("District")
            .required(config.required)
            .located_in(ADMIN_STRUCTURE, Some(province.as_str())),
        FieldConfig::new(&urban_or_rural, FieldType::RadioGroup)
            .label("Urban or rural")
            .options(vec![
                SelectOption::new(URBAN, "Urban"),
                SelectOption::new(RURAL, "Rural"),
            ])
            .default_value(URBAN),
    ];
    fields.extend(domestic.into_iter().map(|f| f.show_when(is_domestic())));

    let urban = [
        ("town", "Town"),
        ("residentialArea", "Residential area"),
        ("street", "Street"),
        ("number", "Number"),
        ("zipCode", "Postcode / Zip"),
    ];
    fields.extend(urban.into_iter().map(|(part, label)| {
        FieldConfig::new(config.id(part), FieldType::Text)
            .label(label)
            .show_when(and([is_domestic(), not(is_rural())]))
    }));
    fields.push(
        FieldConfig::new(config.id("village"), FieldType::Text)
            .label("Village")
            .show_when(and([is_domestic(), is_rural()])),
    );

    let international = [
        ("state", "State", true),
        ("district2", "District", true),
        ("cityOrTown", "City / Town", false),
        ("addressLine1", "Address line 1", false),
        ("addressLine2", "Address line 2", false),
        ("addressLine3", "Address line 3", false),
        ("postcodeOrZip", "Postcode / Zip", false),
    ];
    fields.extend(international.into_iter().map(|(part, label, required)| {
        FieldConfig::new(config.id(part), FieldType::Text)
            .label(label)
            .required(config.required && required)
            .hide_when(hide_international(&country, &config.domestic_country))
    }));
    fields
}

/// International subset stays hidden until a non-domestic country is chosen.
fn hide_international(country: &str, domestic: &str) -> Expr {
    or([field(country).is_undefined(), field(country).is_equal_to(domestic)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EngineOptions;
    use crate::location::{LocationTree, field_options};
    use crate::publish::publish;
    use crate::spec::{FormSpec, PageConfig};
    use crate::visibility::resolve_visibility;
    use serde_json::json;

    fn form() -> crate::publish::PublishedForm {
        let config = AddressConfig::new("applicant.address", "FAR")
            .countries(vec![
                SelectOption::new("FAR", "Farajaland"),
                SelectOption::new("GBR", "United Kingdom"),
            ])
            .required(true);
        publish(FormSpec {
            id: "address".into(),
            version: "1".into(),
            title: None,
            pages: vec![PageConfig::new("address", "Address", address_fields(&config))],
        })
        .expect("publish")
    }

    fn locations() -> LocationTree {
        serde_json::from_value(json!([
            { "id": "Sulaka", "name": "Sulaka", "location_type": "ADMIN_STRUCTURE" },
            { "id": "Pualula", "name": "Pualula", "location_type": "ADMIN_STRUCTURE" },
            { "id": "Ilanga", "name": "Ilanga", "location_type": "ADMIN_STRUCTURE", "part_of": "Sulaka" },
            { "id": "Irundu", "name": "Irundu", "location_type": "ADMIN_STRUCTURE", "part_of": "Sulaka" },
            { "id": "Zobwe", "name": "Zobwe", "location_type": "ADMIN_STRUCTURE", "part_of": "Sulaka" },
            { "id": "Afue", "name": "Afue", "location_type": "ADMIN_STRUCTURE", "part_of": "Pualula" }
        ]))
        .expect("locations")
    }

    #[test]
    fn domestic_and_international_are_mutually_exclusive() {
        let form = form();
        let options = EngineOptions::default();
        for country in [json!("FAR"), json!("GBR"), json!(null)] {
            let record = form.record_from_json(&json!({ "applicant.address.country": country }));
            let map = resolve_visibility(&form, &record, &options).expect("resolve");
            let domestic = map["applicant.address.province"];
            let international = map["applicant.address.state"];
            assert!(!(domestic && international), "country {country}");
        }

        let far = form.record_from_json(&json!({ "applicant.address.country": "FAR" }));
        let map = resolve_visibility(&form, &far, &options).expect("resolve");
        assert!(map["applicant.address.district"]);
        assert!(map["applicant.address.town"]);
        assert!(!map["applicant.address.village"]);
        assert!(!map["applicant.address.cityOrTown"]);

        let abroad = form.record_from_json(&json!({ "applicant.address.country": "GBR" }));
        let map = resolve_visibility(&form, &abroad, &options).expect("resolve");
        assert!(!map["applicant.address.district"]);
        assert!(map["applicant.address.addressLine1"]);
    }

    #[test]
    fn rural_swaps_street_for_village() {
        let form = form();
        let record = form.record_from_json(&json!({
            "applicant.address.country": "FAR",
            "applicant.address.urbanOrRural": "RURAL"
        }));
        let map = resolve_visibility(&form, &record, &EngineOptions::default()).expect("resolve");
        assert!(map["applicant.address.village"]);
        assert!(!map["applicant.address.street"]);
    }

    #[test]
    fn district_options_follow_the_chosen_province() {
        let form = form();
        let tree = locations();
        let options = EngineOptions::default().with_locations(&tree);
        let record = form.record_from_json(&json!({
            "applicant.address.country": "FAR",
            "applicant.address.province": "Sulaka"
        }));
        let districts = field_options(&form, &record, "applicant.address.district", &options)
            .expect("options")
            .into_iter()
            .map(|option| option.value)
            .collect::<Vec<_>>();
        assert_eq!(districts, vec!["Ilanga", "Irundu", "Zobwe"]);

        let no_province = form.record_from_json(&json!({ "applicant.address.country": "FAR" }));
        assert!(
            field_options(&form, &no_province, "applicant.address.district", &options)
                .expect("options")
                .is_empty()
        );
    }
}

//! Read-only reference tables: the indicator registry, dataflow routing by
//! code prefix, and country groupings used for enrichment.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

use serde::Serialize;

/// Dataflow that carries most indicators and is always tried last.
pub const GLOBAL_DATAFLOW: &str = "GLOBAL_DATAFLOW";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndicatorInfo {
    pub code: &'static str,
    pub name: &'static str,
    pub dataflow: &'static str,
    pub sdg_target: &'static str,
    pub unit: &'static str,
}

impl IndicatorInfo {
    /// Category reported by enrichment: the dataflow the indicator lives in.
    pub fn category(&self) -> &'static str {
        self.dataflow
    }
}

const fn info(
    code: &'static str,
    name: &'static str,
    dataflow: &'static str,
    sdg_target: &'static str,
    unit: &'static str,
) -> IndicatorInfo {
    IndicatorInfo {
        code,
        name,
        dataflow,
        sdg_target,
        unit,
    }
}

const PER_1000_BIRTHS: &str = "Deaths per 1,000 live births";
const PERCENT: &str = "Percentage";

pub const INDICATORS: &[IndicatorInfo] = &[
    info("CME_MRM0", "Neonatal mortality rate", "CME", "3.2.2", PER_1000_BIRTHS),
    info("CME_MRY0T4", "Under-5 mortality rate", "CME", "3.2.1", PER_1000_BIRTHS),
    info(
        "NT_ANT_HAZ_NE2_MOD",
        "Stunting prevalence (moderate + severe)",
        "NUTRITION",
        "2.2.1",
        PERCENT,
    ),
    info("NT_ANT_WHZ_NE2", "Wasting prevalence", "NUTRITION", "2.2.2", PERCENT),
    info(
        "NT_ANT_WHZ_PO2_MOD",
        "Overweight prevalence (moderate + severe)",
        "NUTRITION",
        "2.2.2",
        PERCENT,
    ),
    info(
        "ED_ANAR_L02",
        "Adjusted net attendance rate, primary education",
        "EDUCATION_UIS_SDG",
        "4.1.1",
        PERCENT,
    ),
    info(
        "ED_CR_L1_UIS_MOD",
        "Completion rate, primary education",
        "EDUCATION_UIS_SDG",
        "4.1.1",
        PERCENT,
    ),
    info(
        "ED_CR_L2_UIS_MOD",
        "Completion rate, lower secondary education",
        "EDUCATION_UIS_SDG",
        "4.1.1",
        PERCENT,
    ),
    info(
        "ED_READ_L2",
        "Reading proficiency, end of lower secondary",
        "EDUCATION_UIS_SDG",
        "4.1.1",
        PERCENT,
    ),
    info(
        "ED_MAT_L2",
        "Mathematics proficiency, end of lower secondary",
        "EDUCATION_UIS_SDG",
        "4.1.1",
        PERCENT,
    ),
    info("IM_DTP3", "DTP3 immunization coverage", "IMMUNISATION", "3.b.1", PERCENT),
    info(
        "IM_MCV1",
        "Measles immunization coverage (MCV1)",
        "IMMUNISATION",
        "3.b.1",
        PERCENT,
    ),
    info(
        "HVA_EPI_INF_RT",
        "HIV incidence rate",
        "HIV_AIDS",
        "3.3.1",
        "Per 1,000 uninfected population",
    ),
    info(
        "WS_PPL_W-SM",
        "Population using safely managed drinking water services",
        "WASH_HOUSEHOLDS",
        "6.1.1",
        PERCENT,
    ),
    info(
        "WS_PPL_S-SM",
        "Population using safely managed sanitation services",
        "WASH_HOUSEHOLDS",
        "6.2.1",
        PERCENT,
    ),
    info(
        "WS_PPL_H-B",
        "Population with basic handwashing facilities",
        "WASH_HOUSEHOLDS",
        "6.2.1",
        PERCENT,
    ),
    info(
        "MNCH_MMR",
        "Maternal mortality ratio",
        "MNCH",
        "3.1.1",
        "Deaths per 100,000 live births",
    ),
    info("MNCH_SAB", "Skilled attendance at birth", "MNCH", "3.1.2", PERCENT),
    info(
        "MNCH_ABR",
        "Adolescent birth rate",
        "MNCH",
        "3.7.2",
        "Births per 1,000 women aged 15-19",
    ),
    info(
        "PT_CHLD_Y0T4_REG",
        "Birth registration (children under 5)",
        "PT",
        "16.9.1",
        PERCENT,
    ),
    info(
        "PT_CHLD_1-14_PS-PSY-V_CGVR",
        "Violent discipline (children 1-14)",
        "PT",
        "16.2.1",
        PERCENT,
    ),
    info(
        "PT_F_20-24_MRD_U18_TND",
        "Child marriage before age 18 (women 20-24)",
        "PT_CM",
        "5.3.1",
        PERCENT,
    ),
    info(
        "PT_F_15-49_FGM",
        "Female genital mutilation prevalence (women 15-49)",
        "PT_FGM",
        "5.3.2",
        PERCENT,
    ),
    info(
        "ECD_CHLD_LMPSL",
        "Children developmentally on track (literacy-numeracy, physical, social-emotional)",
        "ECD",
        "4.2.1",
        PERCENT,
    ),
    info(
        "PV_CHLD_DPRV-S-L1-HS",
        "Child multidimensional poverty (severe deprivation in at least 1 dimension)",
        "CHLD_PVTY",
        "1.2.1",
        PERCENT,
    ),
];

const PREFIX_DATAFLOWS: &[(&str, &str)] = &[
    ("CME", "CME"),
    ("NT", "NUTRITION"),
    ("ED", "EDUCATION_UIS_SDG"),
    ("IM", "IMMUNISATION"),
    ("HVA", "HIV_AIDS"),
    ("WS", "WASH_HOUSEHOLDS"),
    ("MNCH", "MNCH"),
    ("PT", "PT"),
    ("ECD", "ECD"),
    ("PV", "CHLD_PVTY"),
];

/// Dataflows that also publish indicators of a prefix family.
const PREFIX_ALTERNATIVES: &[(&str, &[&str])] = &[
    ("CME", &["CME_SUBNAT"]),
    ("NT", &["NUTRITION"]),
    ("ED", &["EDUCATION_UIS_SDG", "EDUCATION"]),
    ("WS", &["WASH_HOUSEHOLDS", "WASH_SCHOOLS", "WASH_HEALTHCARE_FACILITY"]),
    ("PT", &["PT", "PT_CM", "PT_FGM", "PT_CONFLICT"]),
    ("HVA", &["HIV_AIDS"]),
    ("ECD", &["ECD", "EDUCATION"]),
    ("PV", &["CHLD_PVTY"]),
];

static INDICATOR_INDEX: LazyLock<HashMap<&'static str, &'static IndicatorInfo>> =
    LazyLock::new(|| INDICATORS.iter().map(|info| (info.code, info)).collect());

pub fn indicator_info(code: &str) -> Option<&'static IndicatorInfo> {
    INDICATOR_INDEX.get(code).copied()
}

pub fn dataflow_for_indicator(code: &str) -> Option<&'static str> {
    indicator_info(code).map(|info| info.dataflow)
}

pub fn dataflow_for_prefix(prefix: &str) -> Option<&'static str> {
    PREFIX_DATAFLOWS
        .iter()
        .find(|(candidate, _)| *candidate == prefix)
        .map(|(_, dataflow)| *dataflow)
}

pub fn alternative_dataflows(prefix: &str) -> &'static [&'static str] {
    PREFIX_ALTERNATIVES
        .iter()
        .find(|(candidate, _)| *candidate == prefix)
        .map(|(_, dataflows)| *dataflows)
        .unwrap_or(&[])
}

pub fn indicators_by_sdg_target(target: &str) -> Vec<&'static IndicatorInfo> {
    IndicatorQuery {
        sdg_target: Some(target.to_string()),
        ..IndicatorQuery::default()
    }
    .matches()
}

pub fn indicators_by_dataflow(dataflow: &str) -> Vec<&'static IndicatorInfo> {
    IndicatorQuery {
        dataflow: Some(dataflow.to_string()),
        ..IndicatorQuery::default()
    }
    .matches()
}

/// Distinct SDG targets covered by the registry, sorted.
pub fn sdg_targets() -> Vec<&'static str> {
    INDICATORS
        .iter()
        .map(|info| info.sdg_target)
        .filter(|target| !target.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Registry categories with the number of indicators in each.
pub fn categories() -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for info in INDICATORS {
        *counts.entry(info.category()).or_insert(0) += 1;
    }
    counts
}

/// Case-insensitive substring search over indicator codes and names.
pub fn search_indicators(term: &str, category: Option<&str>) -> Vec<&'static IndicatorInfo> {
    IndicatorQuery {
        text: Some(term.to_string()),
        category: category.map(str::to_string),
        ..IndicatorQuery::default()
    }
    .matches()
}

/// Conjunctive filter over the registry. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndicatorQuery {
    pub category: Option<String>,
    /// Whole SDG goal, e.g. `3` matches targets `3.2.1` and `3.b.1`.
    pub sdg_goal: Option<String>,
    pub sdg_target: Option<String>,
    pub dataflow: Option<String>,
    pub prefix: Option<String>,
    pub text: Option<String>,
}

impl IndicatorQuery {
    fn accepts(&self, info: &IndicatorInfo) -> bool {
        let same = |wanted: &Option<String>, actual: &str| {
            wanted
                .as_deref()
                .is_none_or(|wanted| wanted.trim().eq_ignore_ascii_case(actual))
        };
        let goal = self.sdg_goal.as_deref().map(|goal| format!("{}.", goal.trim()));
        let prefix = self
            .prefix
            .as_deref()
            .map(|prefix| format!("{}_", prefix.trim().to_ascii_uppercase()));
        let text = self.text.as_deref().map(|text| text.trim().to_lowercase());

        same(&self.category, info.category())
            && same(&self.dataflow, info.dataflow)
            && same(&self.sdg_target, info.sdg_target)
            && goal.is_none_or(|goal| info.sdg_target.starts_with(&goal))
            && prefix.is_none_or(|prefix| info.code.starts_with(&prefix))
            && text.is_none_or(|text| {
                info.code.to_lowercase().contains(&text) || info.name.to_lowercase().contains(&text)
            })
    }

    /// Matching registry entries ordered by code.
    pub fn matches(&self) -> Vec<&'static IndicatorInfo> {
        let mut found: Vec<_> = INDICATORS.iter().filter(|info| self.accepts(info)).collect();
        found.sort_by_key(|info| info.code);
        found
    }

    pub fn codes(&self) -> Vec<&'static str> {
        self.matches().into_iter().map(|info| info.code).collect()
    }
}

pub const EAST_ASIA_PACIFIC: &str = "East Asia and Pacific";
pub const EUROPE_CENTRAL_ASIA: &str = "Europe and Central Asia";
pub const LATIN_AMERICA_CARIBBEAN: &str = "Latin America and Caribbean";
pub const MIDDLE_EAST_NORTH_AFRICA: &str = "Middle East and North Africa";
pub const NORTH_AMERICA: &str = "North America";
pub const SOUTH_ASIA: &str = "South Asia";
pub const SUB_SAHARAN_AFRICA: &str = "Sub-Saharan Africa";

const REGIONS: &[(&str, &[&str])] = &[
    (
        EAST_ASIA_PACIFIC,
        &[
            "AUS", "BRN", "KHM", "CHN", "PRK", "FJI", "IDN", "JPN", "KIR", "LAO", "MYS", "MHL",
            "FSM", "MNG", "MMR", "NRU", "NZL", "PLW", "PNG", "PHL", "WSM", "SGP", "SLB", "KOR",
            "THA", "TLS", "TON", "TUV", "VUT", "VNM",
        ],
    ),
    (
        EUROPE_CENTRAL_ASIA,
        &[
            "ALB", "ARM", "AUT", "AZE", "BLR", "BEL", "BIH", "BGR", "HRV", "CYP", "CZE", "DNK",
            "EST", "FIN", "FRA", "GEO", "DEU", "GRC", "HUN", "ISL", "IRL", "ITA", "KAZ", "KGZ",
            "LVA", "LTU", "LUX", "MKD", "MLT", "MDA", "MNE", "NLD", "NOR", "POL", "PRT", "ROU",
            "RUS", "SRB", "SVK", "SVN", "ESP", "SWE", "CHE", "TJK", "TUR", "TKM", "UKR", "GBR",
            "UZB",
        ],
    ),
    (
        LATIN_AMERICA_CARIBBEAN,
        &[
            "ATG", "ARG", "BHS", "BRB", "BLZ", "BOL", "BRA", "CHL", "COL", "CRI", "CUB", "DMA",
            "DOM", "ECU", "SLV", "GRD", "GTM", "GUY", "HTI", "HND", "JAM", "MEX", "NIC", "PAN",
            "PRY", "PER", "KNA", "LCA", "VCT", "SUR", "TTO", "URY", "VEN",
        ],
    ),
    (
        MIDDLE_EAST_NORTH_AFRICA,
        &[
            "DZA", "BHR", "DJI", "EGY", "IRN", "IRQ", "ISR", "JOR", "KWT", "LBN", "LBY", "MAR",
            "OMN", "QAT", "SAU", "SDN", "SYR", "TUN", "ARE", "YEM", "PSE",
        ],
    ),
    (NORTH_AMERICA, &["CAN", "USA"]),
    (
        SOUTH_ASIA,
        &["AFG", "BGD", "BTN", "IND", "MDV", "NPL", "PAK", "LKA"],
    ),
    (
        SUB_SAHARAN_AFRICA,
        &[
            "AGO", "BEN", "BWA", "BFA", "BDI", "CPV", "CMR", "CAF", "TCD", "COM", "COG", "COD",
            "CIV", "GNQ", "ERI", "SWZ", "ETH", "GAB", "GMB", "GHA", "GIN", "GNB", "KEN", "LSO",
            "LBR", "MDG", "MWI", "MLI", "MRT", "MUS", "MOZ", "NAM", "NER", "NGA", "RWA", "STP",
            "SEN", "SYC", "SLE", "SOM", "ZAF", "SSD", "TZA", "TGO", "UGA", "ZMB", "ZWE",
        ],
    ),
];

const INCOME_GROUPS: &[(&str, &[&str])] = &[
    (
        "High income",
        &[
            "AUS", "AUT", "BEL", "CAN", "CHE", "CHL", "CZE", "DEU", "DNK", "ESP", "EST", "FIN",
            "FRA", "GBR", "GRC", "HUN", "IRL", "ISL", "ISR", "ITA", "JPN", "KOR", "LTU", "LUX",
            "LVA", "NLD", "NOR", "NZL", "POL", "PRT", "SAU", "SGP", "SVK", "SVN", "SWE", "USA",
            "URY", "ARE", "BHR", "KWT", "OMN", "QAT", "HRV", "CYP", "MLT", "BRN", "TWN", "HKG",
            "MAC", "PAN", "TTO", "BHS", "BRB", "ATG", "KNA", "SYC", "PLW", "NRU", "GUM", "PRI",
        ],
    ),
    (
        "Upper middle income",
        &[
            "ARG", "BGR", "BRA", "CHN", "COL", "CRI", "DOM", "ECU", "GAB", "GNQ", "GTM", "IRN",
            "IRQ", "JAM", "JOR", "KAZ", "LBN", "LBY", "MEX", "MKD", "MNE", "MUS", "MYS", "NAM",
            "PER", "ROU", "RUS", "SRB", "THA", "TUR", "TKM", "VEN", "ZAF", "ALB", "ARM", "AZE",
            "BIH", "BWA", "CUB", "DMA", "FJI", "GEO", "GRD", "GUY", "LCA", "MDV", "MHL", "PRY",
            "SUR", "TON", "TUV", "VCT", "XKX",
        ],
    ),
    (
        "Lower middle income",
        &[
            "AGO", "BEN", "BGD", "BLZ", "BOL", "BTN", "CIV", "CMR", "COG", "COM", "CPV", "DJI",
            "DZA", "EGY", "GHA", "HND", "HTI", "IDN", "IND", "KEN", "KGZ", "KHM", "KIR", "LAO",
            "LKA", "LSO", "MAR", "MDA", "MMR", "MNG", "MRT", "NGA", "NIC", "NPL", "PAK", "PHL",
            "PNG", "PSE", "SEN", "SLB", "SLV", "STP", "SWZ", "TJK", "TLS", "TUN", "TZA", "UKR",
            "UZB", "VNM", "VUT", "WSM", "ZMB", "ZWE",
        ],
    ),
    (
        "Low income",
        &[
            "AFG", "BDI", "BFA", "CAF", "COD", "ERI", "ETH", "GMB", "GIN", "GNB", "LBR", "MDG",
            "MLI", "MOZ", "MWI", "NER", "PRK", "RWA", "SDN", "SLE", "SOM", "SSD", "SYR", "TCD",
            "TGO", "UGA", "YEM",
        ],
    ),
];

const CONTINENTS: &[(&str, &[&str])] = &[
    (
        "Africa",
        &[
            "DZA", "AGO", "BEN", "BWA", "BFA", "BDI", "CPV", "CMR", "CAF", "TCD", "COM", "COG",
            "COD", "CIV", "DJI", "EGY", "GNQ", "ERI", "SWZ", "ETH", "GAB", "GMB", "GHA", "GIN",
            "GNB", "KEN", "LSO", "LBR", "LBY", "MDG", "MWI", "MLI", "MRT", "MUS", "MAR", "MOZ",
            "NAM", "NER", "NGA", "RWA", "STP", "SEN", "SYC", "SLE", "SOM", "ZAF", "SSD", "SDN",
            "TZA", "TGO", "TUN", "UGA", "ZMB", "ZWE",
        ],
    ),
    (
        "Asia",
        &[
            "AFG", "ARM", "AZE", "BHR", "BGD", "BTN", "BRN", "KHM", "CHN", "CYP", "GEO", "IND",
            "IDN", "IRN", "IRQ", "ISR", "JPN", "JOR", "KAZ", "KWT", "KGZ", "LAO", "LBN", "MYS",
            "MDV", "MNG", "MMR", "NPL", "PRK", "OMN", "PAK", "PSE", "PHL", "QAT", "SAU", "SGP",
            "KOR", "LKA", "SYR", "TJK", "THA", "TLS", "TUR", "TKM", "ARE", "UZB", "VNM", "YEM",
        ],
    ),
    (
        "Europe",
        &[
            "ALB", "AND", "AUT", "BLR", "BEL", "BIH", "BGR", "HRV", "CZE", "DNK", "EST", "FIN",
            "FRA", "DEU", "GRC", "HUN", "ISL", "IRL", "ITA", "LVA", "LIE", "LTU", "LUX", "MLT",
            "MDA", "MCO", "MNE", "NLD", "MKD", "NOR", "POL", "PRT", "ROU", "RUS", "SMR", "SRB",
            "SVK", "SVN", "ESP", "SWE", "CHE", "UKR", "GBR", "VAT",
        ],
    ),
    (
        "North America",
        &[
            "ATG", "BHS", "BRB", "BLZ", "CAN", "CRI", "CUB", "DMA", "DOM", "SLV", "GRD", "GTM",
            "HTI", "HND", "JAM", "MEX", "NIC", "PAN", "KNA", "LCA", "VCT", "TTO", "USA",
        ],
    ),
    (
        "South America",
        &[
            "ARG", "BOL", "BRA", "CHL", "COL", "ECU", "GUY", "PRY", "PER", "SUR", "URY", "VEN",
        ],
    ),
    (
        "Oceania",
        &[
            "AUS", "FJI", "KIR", "MHL", "FSM", "NRU", "NZL", "PLW", "PNG", "WSM", "SLB", "TON",
            "TUV", "VUT",
        ],
    ),
];

type CountryIndex = HashMap<&'static str, &'static str>;

fn invert(groups: &'static [(&'static str, &'static [&'static str])]) -> CountryIndex {
    let mut index = HashMap::new();
    for (label, countries) in groups {
        for country in *countries {
            index.entry(*country).or_insert(*label);
        }
    }
    index
}

static REGION_INDEX: LazyLock<CountryIndex> = LazyLock::new(|| invert(REGIONS));
static INCOME_INDEX: LazyLock<CountryIndex> = LazyLock::new(|| invert(INCOME_GROUPS));
static CONTINENT_INDEX: LazyLock<CountryIndex> = LazyLock::new(|| invert(CONTINENTS));

pub fn region(iso3: &str) -> Option<&'static str> {
    REGION_INDEX.get(iso3).copied()
}

pub fn income_group(iso3: &str) -> Option<&'static str> {
    INCOME_INDEX.get(iso3).copied()
}

pub fn continent(iso3: &str) -> Option<&'static str> {
    CONTINENT_INDEX.get(iso3).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lookup() {
        let info = indicator_info("CME_MRY0T4").unwrap();
        assert_eq!(info.name, "Under-5 mortality rate");
        assert_eq!(info.category(), "CME");
        assert!(indicator_info("XX_UNKNOWN").is_none());
    }

    #[test]
    fn prefix_routing() {
        assert_eq!(dataflow_for_prefix("NT"), Some("NUTRITION"));
        assert_eq!(dataflow_for_prefix("ZZ"), None);
        assert!(alternative_dataflows("PT").contains(&"PT_CM"));
        assert!(alternative_dataflows("ZZ").is_empty());
    }

    #[test]
    fn country_groupings() {
        assert_eq!(region("ALB"), Some(EUROPE_CENTRAL_ASIA));
        assert_eq!(income_group("NGA"), Some("Lower middle income"));
        assert_eq!(continent("BRA"), Some("South America"));
        assert_eq!(region("XKX"), None);
    }

    #[test]
    fn registry_queries() {
        let codes = |found: Vec<&'static IndicatorInfo>| -> Vec<&str> {
            found.into_iter().map(|info| info.code).collect()
        };
        assert_eq!(codes(indicators_by_sdg_target("3.b.1")), ["IM_DTP3", "IM_MCV1"]);
        assert_eq!(
            codes(indicators_by_dataflow("pt")),
            ["PT_CHLD_1-14_PS-PSY-V_CGVR", "PT_CHLD_Y0T4_REG"]
        );
        assert!(indicators_by_sdg_target("99.9.9").is_empty());

        let targets = sdg_targets();
        assert_eq!(targets.first(), Some(&"1.2.1"));
        assert!(targets.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(targets.iter().filter(|target| **target == "4.1.1").count(), 1);

        let counts = categories();
        assert_eq!(counts.get("EDUCATION_UIS_SDG"), Some(&5));
        assert_eq!(counts.values().sum::<usize>(), INDICATORS.len());
    }

    #[test]
    fn text_search_and_combined_filters() {
        let found = search_indicators("MORTALITY", None);
        assert_eq!(
            found.iter().map(|info| info.code).collect::<Vec<_>>(),
            ["CME_MRM0", "CME_MRY0T4", "MNCH_MMR"]
        );
        assert_eq!(search_indicators("mortality", Some("MNCH")).len(), 1);
        assert!(search_indicators("mortality", Some("NUTRITION")).is_empty());

        let goal_three = IndicatorQuery {
            sdg_goal: Some("3".to_string()),
            prefix: Some("mnch".to_string()),
            ..IndicatorQuery::default()
        };
        assert_eq!(goal_three.codes(), ["MNCH_ABR", "MNCH_MMR", "MNCH_SAB"]);

        let goal_one = IndicatorQuery {
            sdg_goal: Some("1".to_string()),
            ..IndicatorQuery::default()
        };
        assert_eq!(goal_one.codes(), ["PV_CHLD_DPRV-S-L1-HS"]);
        assert_eq!(IndicatorQuery::default().codes().len(), INDICATORS.len());
    }
}

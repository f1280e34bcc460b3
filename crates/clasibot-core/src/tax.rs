//! Province-scoped tax code resolution
//!
//! A tax code is a named bundle of tax rates. The codes a transaction may use
//! depend on the company's province: every province gets the federal base set,
//! and provinces with their own sales tax add their bundles on top.

use serde::{Deserialize, Serialize};

use crate::models::CompanyInfo;

/// Codes valid in every province
pub const BASE_TAX_CODES: &[&str] = &["Exempt", "Zero-rated", "Out of Scope", "GST"];

/// Canadian provinces and territories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Province {
    AB,
    BC,
    MB,
    NB,
    NL,
    NS,
    NT,
    NU,
    ON,
    PE,
    QC,
    SK,
    YT,
}

impl Province {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AB => "AB",
            Self::BC => "BC",
            Self::MB => "MB",
            Self::NB => "NB",
            Self::NL => "NL",
            Self::NS => "NS",
            Self::NT => "NT",
            Self::NU => "NU",
            Self::ON => "ON",
            Self::PE => "PE",
            Self::QC => "QC",
            Self::SK => "SK",
            Self::YT => "YT",
        }
    }

    /// Province-specific codes added to [`BASE_TAX_CODES`]
    pub fn provincial_codes(&self) -> &'static [&'static str] {
        match self {
            Self::BC => &["GST/PST BC", "PST BC"],
            Self::MB => &["GST/PST MB", "PST MB"],
            Self::SK => &["GST/PST SK", "PST SK"],
            Self::QC => &["GST/QST QC - 9.975", "QST QC - 9.975"],
            Self::NS => &["HST NS"],
            Self::ON => &["HST ON"],
            Self::NB => &["HST NB 2016"],
            Self::NL => &["HST NL 2016"],
            Self::PE => &["HST PE 2016"],
            Self::AB | Self::NT | Self::NU | Self::YT => &[],
        }
    }

    /// Names of every code valid in this province
    pub fn valid_codes(&self) -> Vec<&'static str> {
        BASE_TAX_CODES
            .iter()
            .chain(self.provincial_codes().iter())
            .copied()
            .collect()
    }

    /// Province of a company, if it is located in Canada
    pub fn for_company(info: &CompanyInfo) -> Option<Province> {
        let country = info.location.country.trim();
        if !(country.eq_ignore_ascii_case("CA") || country.eq_ignore_ascii_case("Canada")) {
            return None;
        }
        info.location.sub_location.as_deref()?.parse().ok()
    }
}

impl std::str::FromStr for Province {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "AB" => Ok(Self::AB),
            "BC" => Ok(Self::BC),
            "MB" => Ok(Self::MB),
            "NB" => Ok(Self::NB),
            "NL" => Ok(Self::NL),
            "NS" => Ok(Self::NS),
            // the ledger reports the Northwest Territories as NW
            "NT" | "NW" => Ok(Self::NT),
            "NU" => Ok(Self::NU),
            "ON" => Ok(Self::ON),
            "PE" => Ok(Self::PE),
            "QC" => Ok(Self::QC),
            "SK" => Ok(Self::SK),
            "YT" => Ok(Self::YT),
            _ => Err(format!("Unknown province: {}", s)),
        }
    }
}

impl std::fmt::Display for Province {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named bundle of tax rates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxCode {
    pub id: String,
    pub name: String,
    /// Constituent tax rate names
    pub rates: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl TaxCode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, rates: &[&str]) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rates: rates.iter().map(|r| r.to_string()).collect(),
            active: true,
        }
    }

    pub fn contains_rate(&self, rate: &str) -> bool {
        let rate = rate.trim();
        self.rates.iter().any(|r| r.trim().eq_ignore_ascii_case(rate))
    }
}

/// Resolves the tax code for a transaction from a company's tax codes
#[derive(Debug, Clone, Default)]
pub struct TaxCodeResolver {
    codes: Vec<TaxCode>,
}

impl TaxCodeResolver {
    pub fn new(codes: Vec<TaxCode>) -> Self {
        Self { codes }
    }

    /// Resolver over the reference Canadian bundles
    pub fn canadian_defaults() -> Self {
        Self::new(default_canadian_tax_codes())
    }

    /// Active codes valid in `province`, in table order
    pub fn codes_for(&self, province: Province) -> Vec<&TaxCode> {
        let valid = province.valid_codes();
        self.codes
            .iter()
            .filter(|c| c.active && valid.iter().any(|v| v.eq_ignore_ascii_case(c.name.trim())))
            .collect()
    }

    /// Find the tax code whose rate set contains one of `candidate_rates`
    ///
    /// When several codes match, the one with the fewest constituent rates wins;
    /// remaining ties go to the earlier candidate rate, then table order.
    /// Returns `None` when no valid code contains any candidate.
    pub fn resolve_tax_code(&self, province: Province, candidate_rates: &[String]) -> Option<TaxCode> {
        let codes = self.codes_for(province);

        let mut best: Option<&TaxCode> = None;
        for rate in candidate_rates {
            for code in codes.iter().filter(|c| c.contains_rate(rate)) {
                match best {
                    Some(current) if current.rates.len() <= code.rates.len() => {}
                    _ => best = Some(code),
                }
            }
        }

        best.cloned()
    }
}

/// Reference rate bundles for the Canadian tax codes
pub fn default_canadian_tax_codes() -> Vec<TaxCode> {
    vec![
        TaxCode::new("exempt", "Exempt", &["Exempt"]),
        TaxCode::new("zero-rated", "Zero-rated", &["Zero-rated"]),
        TaxCode::new("out-of-scope", "Out of Scope", &["Out of Scope"]),
        TaxCode::new("gst", "GST", &["GST Purchase"]),
        TaxCode::new("gst-pst-bc", "GST/PST BC", &["GST Purchase", "PST (BC) Purchase"]),
        TaxCode::new("pst-bc", "PST BC", &["PST (BC) Purchase"]),
        TaxCode::new("gst-pst-mb", "GST/PST MB", &["GST Purchase", "PST (MB) Purchase"]),
        TaxCode::new("pst-mb", "PST MB", &["PST (MB) Purchase"]),
        TaxCode::new("gst-pst-sk", "GST/PST SK", &["GST Purchase", "PST (SK) Purchase"]),
        TaxCode::new("pst-sk", "PST SK", &["PST (SK) Purchase"]),
        TaxCode::new(
            "gst-qst-qc",
            "GST/QST QC - 9.975",
            &["GST Purchase", "QST (QC) Purchase 9.975"],
        ),
        TaxCode::new("qst-qc", "QST QC - 9.975", &["QST (QC) Purchase 9.975"]),
        TaxCode::new("hst-ns", "HST NS", &["HST (NS) Purchase"]),
        TaxCode::new("hst-on", "HST ON", &["HST (ON) Purchase"]),
        TaxCode::new("hst-nb", "HST NB 2016", &["HST (NB) 2016 Purchase"]),
        TaxCode::new("hst-nl", "HST NL 2016", &["HST (NL) 2016 Purchase"]),
        TaxCode::new("hst-pe", "HST PE 2016", &["HST (PE) 2016 Purchase"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CompanyLocation;

    fn rates(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_bc_pst_rate_resolves_to_pst_bc() {
        let resolver = TaxCodeResolver::canadian_defaults();
        let code = resolver
            .resolve_tax_code(Province::BC, &rates(&["PST (BC) Purchase"]))
            .unwrap();
        assert_eq!(code.name, "PST BC");
    }

    #[test]
    fn test_unknown_rate_resolves_to_none() {
        let resolver = TaxCodeResolver::canadian_defaults();
        assert!(resolver
            .resolve_tax_code(Province::BC, &rates(&["Luxury Surtax"]))
            .is_none());
        assert!(resolver.resolve_tax_code(Province::BC, &[]).is_none());
    }

    #[test]
    fn test_rate_outside_province_resolves_to_none() {
        let resolver = TaxCodeResolver::canadian_defaults();
        // PST BC is not valid in Ontario
        assert!(resolver
            .resolve_tax_code(Province::ON, &rates(&["PST (BC) Purchase"]))
            .is_none());
    }

    #[test]
    fn test_fewest_rates_wins() {
        let resolver = TaxCodeResolver::canadian_defaults();
        // GST Purchase is in GST, GST/PST BC; GST has a single rate
        let code = resolver
            .resolve_tax_code(Province::BC, &rates(&["GST Purchase", "PST (BC) Purchase"]))
            .unwrap();
        assert_eq!(code.name, "GST");
    }

    #[test]
    fn test_inactive_codes_skipped() {
        let mut codes = default_canadian_tax_codes();
        for code in codes.iter_mut() {
            if code.name == "PST BC" {
                code.active = false;
            }
        }
        let resolver = TaxCodeResolver::new(codes);
        let code = resolver
            .resolve_tax_code(Province::BC, &rates(&["pst (bc) purchase"]))
            .unwrap();
        assert_eq!(code.name, "GST/PST BC");
    }

    #[test]
    fn test_province_valid_codes() {
        assert_eq!(Province::AB.valid_codes(), BASE_TAX_CODES.to_vec());
        assert!(Province::QC.valid_codes().contains(&"QST QC - 9.975"));
        assert_eq!("nw".parse::<Province>().unwrap(), Province::NT);
        assert!("XX".parse::<Province>().is_err());
    }

    #[test]
    fn test_province_for_company() {
        let mut info = CompanyInfo {
            name: "Acme".into(),
            industry: None,
            location: CompanyLocation {
                country: "CA".into(),
                sub_location: Some("BC".into()),
            },
        };
        assert_eq!(Province::for_company(&info), Some(Province::BC));

        info.location.sub_location = None;
        assert_eq!(Province::for_company(&info), None);

        info.location = CompanyLocation {
            country: "US".into(),
            sub_location: Some("CA".into()),
        };
        assert_eq!(Province::for_company(&info), None);
    }
}

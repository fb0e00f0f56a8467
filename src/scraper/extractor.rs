use regex::Regex;

use super::browser::BrowserSession;
use super::selectors::{form, panel};
use crate::config;
use crate::models::FapRecord;

/// Scrape the result panel after a consulta. Every field is best-effort:
/// a missing cell becomes an empty string, never an error.
pub async fn extract_result_data(session: &BrowserSession, year: &str) -> FapRecord {
    // The panel and the alíquota block render at different times.
    let _ = session
        .wait_visible(panel::INFO_ROOT, config::TIMEOUT_PANEL)
        .await;
    let _ = session
        .wait_visible(panel::ALIQUOTA, config::TIMEOUT_PANEL)
        .await;

    let company_name = session.safe_text(panel::RAZAO_SOCIAL).await;
    let establishment_cnpj = session.safe_text(panel::CNPJ_ESTAB).await;

    let mut uf = session.safe_text(panel::UF).await;
    let mut municipality = session.safe_text(panel::MUNICIPIO).await;
    // Some layouts put the whole address into one cell; split it apart.
    if looks_like_address(&municipality) {
        let (parsed_muni, parsed_uf) = parse_municipality_uf(&municipality);
        if !parsed_muni.is_empty() {
            municipality = parsed_muni;
        }
        if !parsed_uf.is_empty() {
            uf = parsed_uf;
        }
    } else if looks_like_address(&uf) {
        let (parsed_muni, parsed_uf) = parse_municipality_uf(&uf);
        if !parsed_muni.is_empty() {
            municipality = parsed_muni;
        }
        if !parsed_uf.is_empty() {
            uf = parsed_uf;
        }
    }

    let aliquota = session.safe_text(panel::ALIQUOTA).await;
    // The establishment name is whatever the combobox currently shows.
    let establishment_name = session.input_value(form::ESTABLISHMENT_INPUT).await;

    // Timestamp lands after the field reads, so it reflects scrape time.
    let mut record = FapRecord::new(year);
    record.cnpj_root = FapRecord::root_from_cnpj(&establishment_cnpj);
    record.company_name = company_name;
    record.establishment_cnpj = establishment_cnpj;
    record.establishment_name = establishment_name;
    record.uf = uf;
    record.municipality = municipality;
    record.aliquota = aliquota;

    record
}

fn looks_like_address(text: &str) -> bool {
    !text.is_empty() && (text.contains('-') || text.to_uppercase().contains("CEP"))
}

/// Split an address tail like "AL TESTE, GOIANIA - GO CEP: 74.175-020" into
/// ("GOIANIA", "GO"). The CEP segment is dropped first, then the trailing
/// two-letter state code is peeled off and the municipality is the last
/// comma-separated segment, minus any leftover street number.
pub fn parse_municipality_uf(raw: &str) -> (String, String) {
    if raw.trim().is_empty() {
        return (String::new(), String::new());
    }

    let cep = Regex::new(r"(?i)\bCEP\s*[:：]?\s*\d[\d.\-]*").unwrap();
    let spaces = Regex::new(r"\s+").unwrap();
    let trailing_digits = Regex::new(r"\s+\d+$").unwrap();

    let s = cep.replace_all(raw.trim(), "");
    let s = spaces.replace_all(s.trim(), " ").trim().to_string();

    let muni_dash_uf = Regex::new(r"(.+?)[\s\-/–]+([A-Z]{2})\s*$").unwrap();
    if let Some(caps) = muni_dash_uf.captures(&s) {
        let left = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        let uf = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        let municipality = left.rsplit(',').next().unwrap_or("").trim();
        let municipality = trailing_digits.replace(municipality, "").trim().to_string();
        return (municipality.to_uppercase(), uf.to_uppercase());
    }

    let trailing_uf = Regex::new(r"\b([A-Z]{2})\b\s*$").unwrap();
    let (left, uf) = match trailing_uf.captures(&s) {
        Some(caps) => {
            let start = caps.get(0).map(|m| m.start()).unwrap_or(s.len());
            let uf = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            (s[..start].trim(), uf)
        }
        None => (s.as_str(), ""),
    };
    let municipality = left.rsplit(',').next().unwrap_or("").trim();
    let municipality = trailing_digits.replace(municipality, "").trim().to_string();
    (municipality.to_uppercase(), uf.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_with_cep_and_dash() {
        assert_eq!(
            parse_municipality_uf("RUA X, GOIANIA - GO CEP: 74.175-020"),
            ("GOIANIA".to_string(), "GO".to_string())
        );
    }

    #[test]
    fn full_street_address_keeps_last_comma_segment() {
        assert_eq!(
            parse_municipality_uf("AL DAS ROSAS 120, SETOR SUL, GOIANIA - GO CEP: 74.175-020"),
            ("GOIANIA".to_string(), "GO".to_string())
        );
    }

    #[test]
    fn trailing_uf_without_cep_or_dash() {
        assert_eq!(
            parse_municipality_uf("SAO PAULO SP"),
            ("SAO PAULO".to_string(), "SP".to_string())
        );
    }

    #[test]
    fn slash_separator_and_lowercase_result_uppercased() {
        assert_eq!(
            parse_municipality_uf("Campinas / SP"),
            ("CAMPINAS".to_string(), "SP".to_string())
        );
    }

    #[test]
    fn residual_street_number_is_stripped() {
        assert_eq!(
            parse_municipality_uf("AV BRASIL 1200 - RJ"),
            ("AV BRASIL".to_string(), "RJ".to_string())
        );
    }

    #[test]
    fn no_uf_yields_empty_state() {
        assert_eq!(
            parse_municipality_uf("Município não informado"),
            ("MUNICÍPIO NÃO INFORMADO".to_string(), String::new())
        );
    }

    #[test]
    fn empty_and_blank_inputs() {
        assert_eq!(parse_municipality_uf(""), (String::new(), String::new()));
        assert_eq!(parse_municipality_uf("   "), (String::new(), String::new()));
    }

    #[test]
    fn bare_uf_only() {
        assert_eq!(
            parse_municipality_uf("GO"),
            (String::new(), "GO".to_string())
        );
    }
}

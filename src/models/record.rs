use serde::Serialize;

/// Report column headers, in sheet order. `FapRecord::values` and the serde
/// renames below must stay aligned with this.
pub const REPORT_HEADERS: [&str; 9] = [
    "CNPJ_Raiz",
    "Razao_Social",
    "CNPJ_Estab",
    "Estab_Nome",
    "UF",
    "Municipio",
    "Vigencia",
    "Aliquota",
    "Data_Consulta",
];

/// One consulta result row. Every field is kept as the page shows it,
/// except municipality/UF which are re-parsed from the address block.
/// Serialized names are the report column headers.
#[derive(Debug, Clone, Serialize)]
pub struct FapRecord {
    #[serde(rename = "CNPJ_Raiz")]
    pub cnpj_root: String,
    #[serde(rename = "Razao_Social")]
    pub company_name: String,
    #[serde(rename = "CNPJ_Estab")]
    pub establishment_cnpj: String,
    #[serde(rename = "Estab_Nome")]
    pub establishment_name: String,
    #[serde(rename = "UF")]
    pub uf: String,
    #[serde(rename = "Municipio")]
    pub municipality: String,
    #[serde(rename = "Vigencia")]
    pub vigencia: String,
    #[serde(rename = "Aliquota")]
    pub aliquota: String,
    #[serde(rename = "Data_Consulta")]
    pub consulted_at: String,
}

impl FapRecord {
    pub fn new(vigencia: &str) -> Self {
        Self {
            cnpj_root: String::new(),
            company_name: String::new(),
            establishment_cnpj: String::new(),
            establishment_name: String::new(),
            uf: String::new(),
            municipality: String::new(),
            vigencia: vigencia.to_string(),
            aliquota: String::new(),
            consulted_at: chrono::Local::now().format("%d/%m/%Y %H:%M:%S").to_string(),
        }
    }

    /// Cell values in `REPORT_HEADERS` order.
    pub fn values(&self) -> [&str; 9] {
        [
            &self.cnpj_root,
            &self.company_name,
            &self.establishment_cnpj,
            &self.establishment_name,
            &self.uf,
            &self.municipality,
            &self.vigencia,
            &self.aliquota,
            &self.consulted_at,
        ]
    }

    /// The panel shows the full establishment CNPJ; the root is everything
    /// before the branch separator ("12.345.678/0001-90" -> "12.345.678").
    pub fn root_from_cnpj(cnpj: &str) -> String {
        cnpj.split('/').next().unwrap_or("").trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_align_with_headers() {
        let mut record = FapRecord::new("2025");
        record.cnpj_root = "12.345.678".into();
        record.aliquota = "0,5000".into();

        let values = record.values();
        assert_eq!(values.len(), REPORT_HEADERS.len());
        assert_eq!(values[0], "12.345.678");
        assert_eq!(values[6], "2025");
        assert_eq!(values[7], "0,5000");
    }

    #[test]
    fn root_strips_branch_and_check_digits() {
        assert_eq!(FapRecord::root_from_cnpj("12.345.678/0001-90"), "12.345.678");
        assert_eq!(FapRecord::root_from_cnpj("12.345.678"), "12.345.678");
        assert_eq!(FapRecord::root_from_cnpj(""), "");
        assert_eq!(FapRecord::root_from_cnpj(" 04.696.227 /0001-07"), "04.696.227");
    }
}

//! XPaths for the consulta-fap page and the gov.br SSO screens.
//!
//! Everything here is tied to one observed snapshot of the portal markup.
//! When extraction starts coming back with empty fields, capture the page
//! source and refresh these paths.

/// Form inputs on the left-hand side of the consulta page.
pub mod form {
    /// Vigência (fiscal year) combobox input.
    pub const YEAR_INPUT: &str = "/html/body/div[1]/div[2]/div/div[2]/div/div[1]/form/div/div[1]/div/div[1]/div/div/div/input";

    /// CNPJ raiz combobox input.
    pub const CNPJ_ROOT_INPUT: &str = "/html/body/div/div[2]/div/div[2]/div/div[1]/form/div/div[1]/div/div[2]/div/div/div/input";

    /// Establishment combobox input, repopulated after a CNPJ root is picked.
    pub const ESTABLISHMENT_INPUT: &str = "/html/body/div/div[2]/div/div[2]/div/div[1]/form/div/div[1]/div/div[3]/div/div/div/input";

    /// The "Consultar" submit button.
    pub const CONSULTAR_BUTTON: &str = "/html/body/div/div[2]/div/div[2]/div/div[1]/form/div/div[2]/div/div[2]/button";
}

/// Result panel on the right-hand side, shown after a consulta.
pub mod panel {
    /// Establishment info block.
    pub const INFO_ROOT: &str = "/html/body/div/div[2]/div/div[2]/div[2]/div[1]/div/div[2]";

    pub const RAZAO_SOCIAL: &str = "/html/body/div/div[2]/div/div[2]/div[2]/div[1]/div/div[2]/div/div/div[2]/div/div[1]/span";

    pub const CNPJ_ESTAB: &str = "/html/body/div/div[2]/div/div[2]/div[2]/div[1]/div/div[2]/div/div/div[2]/div/div[2]/div/div[2]/span";

    pub const UF: &str = "/html/body/div/div[2]/div/div[2]/div[2]/div[1]/div/div[2]/div/div/div[2]/div/div[4]/div/div[2]/span";

    /// Same cell as `UF` in the current layout; the address re-parse in the
    /// extractor splits municipality and state apart.
    pub const MUNICIPIO: &str = "/html/body/div/div[2]/div/div[2]/div[2]/div[1]/div/div[2]/div/div/div[2]/div/div[4]/div/div[2]/span";

    /// FAP rate inside the vigência/alíquota block.
    pub const ALIQUOTA: &str = "/html/body/div/div[2]/div/div[2]/div[2]/div[1]/div/div[1]/div/div/div[2]/div/div[1]/span";
}

/// Generic combobox/dropdown option selectors. The portal renders options
/// through a virtualized overlay, so these match several widget flavors.
pub mod dropdown {
    /// Visible, enabled options of whatever dropdown is currently open.
    pub const VISIBLE_OPTIONS: &str = concat!(
        "//*[(@role='option') and not(@aria-disabled='true')]",
        " | //mat-option[not(@disabled)]",
        " | //li[@role='option' and not(contains(@class,'disabled'))]",
        " | //div[contains(@class,'mat-option') and not(contains(@class,'disabled'))]",
    );

    /// Scrollable container of the open option list.
    pub const OPTION_LIST: &str = concat!(
        "//*[@role='listbox']",
        " | //cdk-virtual-scroll-viewport",
        " | //div[contains(@class,'mat-select-panel')]",
        " | //ul[@role='listbox']",
    );

    /// Option the keyboard focus is on, for widgets that mark the row
    /// itself instead of exposing aria-activedescendant on the input.
    pub const ACTIVE_OPTION: &str = concat!(
        "//*[@role='option' and @aria-selected='true']",
        " | //*[@role='option' and contains(@class,'active')]",
    );

    /// Option matched by exact normalized text.
    pub fn option_with_text(text: &str) -> String {
        format!(
            "//*[(@role='option') and normalize-space()='{text}']\
             | //mat-option[normalize-space(.)='{text}']\
             | //li[@role='option' and normalize-space()='{text}']\
             | //div[contains(@class,'mat-option') and normalize-space()='{text}']"
        )
    }
}

/// gov.br SSO screens, used only when the certificate login flow is on.
pub mod sso {
    /// "Seu certificado digital" entry button, in order of preference.
    pub const CERT_BUTTONS: [&str; 4] = [
        "//button[normalize-space()='Seu certificado digital']",
        "//a[normalize-space()='Seu certificado digital']",
        "//*[@role='button' and normalize-space()='Seu certificado digital']",
        "//*[self::a or self::button][contains(normalize-space(),'Certificado digital')]",
    ];

    /// "Entrar" button on portals that show a landing screen first.
    pub const ENTER_GOV: &str = "/html/body/div/div[2]/div/div/div/div[2]/div/button[1]";

    /// In-page confirmation modal shown after picking a certificate.
    pub const CERT_MODAL_OK: &str = "//button[normalize-space()='OK']";

    /// Error banner the SSO raises on a failed captcha.
    pub const CAPTCHA_ERROR: &str = "//*[contains(normalize-space(), 'Captcha inválido')]";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_text_lands_in_every_branch() {
        let xp = dropdown::option_with_text("12.345.678");
        assert_eq!(xp.matches("'12.345.678'").count(), 4);
        assert!(xp.contains("mat-option"));
    }
}

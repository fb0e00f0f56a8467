//! Combobox interaction heuristics. The portal renders its option lists
//! through a virtualized overlay where only the visible rows exist in the
//! DOM, so enumeration has to scroll or key-walk the widget and every click
//! needs a script-level fallback.

use anyhow::Result;
use std::collections::HashSet;
use thirtyfour::prelude::*;
use thirtyfour::Key;
use tokio::time::{sleep, Duration};
use tracing::debug;

use super::browser::BrowserSession;
use super::selectors::dropdown as sel;
use crate::config;

/// Upper bound for the arrow-key walk, well above any real option count.
const MAX_ARROW_STEPS: u32 = 256;

const SCROLL_STEP_PX: u32 = 200;

const CLEAR_INPUT_SCRIPT: &str = "\
const el = arguments[0];
el.value = '';
el.dispatchEvent(new Event('input', {bubbles:true}));
el.dispatchEvent(new Event('change', {bubbles:true}));";

const SCROLL_NEAREST_SCRIPT: &str =
    "arguments[0].scrollIntoView({block:'nearest', inline:'nearest'});";

/// Open the dropdown attached to `input_xpath`. Click first, then a script
/// click, then keyboard (Alt+Down, Space).
pub async fn open_dropdown(session: &BrowserSession, input_xpath: &str) -> Result<WebElement> {
    let element = match session
        .wait_clickable(input_xpath, config::TIMEOUT_DROPDOWN)
        .await
    {
        Ok(element) => element,
        Err(_) => session.wait_present(input_xpath, 15).await?,
    };

    let _ = session.scroll_into_center(&element).await;
    if element.click().await.is_err() {
        if session.js_click(&element).await.is_err() {
            if element.send_keys(Key::Alt + Key::Down).await.is_err() {
                let _ = element.send_keys(" ").await;
            }
        }
    }
    Ok(element)
}

/// Enumerate every option of the dropdown behind `input_xpath`, defeating
/// virtualization with three successively weaker strategies: scroll the
/// option list and harvest as rows materialize, walk it with arrow keys
/// reading the active-option id, or settle for whatever is visible.
pub async fn list_options(session: &BrowserSession, input_xpath: &str) -> Result<Vec<String>> {
    open_dropdown(session, input_xpath).await?;
    wait_for_options(session, 5).await;

    let mut texts = harvest_by_scrolling(session).await.unwrap_or_default();
    if texts.is_empty() {
        debug!("Scroll harvest found no options, walking with arrow keys");
        texts = harvest_by_arrow_keys(session, input_xpath)
            .await
            .unwrap_or_default();
    }
    if texts.is_empty() {
        debug!("Arrow-key walk found no options, scraping visible rows");
        texts = visible_option_texts(session).await;
    }

    close_overlays(session).await;
    Ok(normalize_options(texts))
}

/// Scroll the option-list container stepwise from the top, harvesting the
/// rows rendered at each position, until the scroll offset stops moving.
async fn harvest_by_scrolling(session: &BrowserSession) -> Result<Vec<String>> {
    let container = match session.find(sel::OPTION_LIST).await {
        Ok(container) => container,
        Err(_) => return Ok(Vec::new()),
    };

    session
        .execute_json(
            "arguments[0].scrollTop = 0",
            vec![serde_json::json!(&container)],
        )
        .await?;
    sleep(Duration::from_millis(150)).await;

    let mut seen = HashSet::new();
    let mut texts = Vec::new();
    let mut last_top = -1i64;

    loop {
        for text in visible_option_texts(session).await {
            if seen.insert(text.clone()) {
                texts.push(text);
            }
        }

        session
            .execute_json(
                &format!("arguments[0].scrollTop += {SCROLL_STEP_PX}"),
                vec![serde_json::json!(&container)],
            )
            .await?;
        sleep(Duration::from_millis(150)).await;

        let top = session
            .execute_json(
                "return arguments[0].scrollTop",
                vec![serde_json::json!(&container)],
            )
            .await?;
        match top.as_i64() {
            Some(top) if top != last_top => last_top = top,
            _ => break,
        }
    }

    Ok(texts)
}

/// Walk the open list with ArrowDown, reading the input's
/// aria-activedescendant after each step. Widgets that do not expose the
/// attribute mark the active row itself, so that is the fallback read. A
/// repeated id or repeated fallback text means the list wrapped around.
async fn harvest_by_arrow_keys(
    session: &BrowserSession,
    input_xpath: &str,
) -> Result<Vec<String>> {
    let input = match session.find(input_xpath).await {
        Ok(input) => input,
        Err(_) => return Ok(Vec::new()),
    };

    let mut seen_ids = HashSet::new();
    let mut seen_texts: HashSet<String> = HashSet::new();
    let mut texts = Vec::new();

    for _ in 0..MAX_ARROW_STEPS {
        if input.send_keys(Key::Down).await.is_err() {
            break;
        }
        sleep(Duration::from_millis(80)).await;

        let text = match input.attr("aria-activedescendant").await {
            Ok(Some(id)) if !id.is_empty() => {
                if !seen_ids.insert(id.clone()) {
                    break;
                }
                match session.driver().find(By::Id(id)).await {
                    Ok(option) => option.text().await.unwrap_or_default(),
                    Err(_) => continue,
                }
            }
            _ => match active_option_text(session).await {
                Some(text) if seen_texts.contains(&text) => break,
                Some(text) => text,
                None => break,
            },
        };

        let text = text.trim().to_string();
        if !text.is_empty() && seen_texts.insert(text.clone()) {
            texts.push(text);
        }
    }

    Ok(texts)
}

/// Text of the option currently holding keyboard focus, located through its
/// selection state instead of an id.
async fn active_option_text(session: &BrowserSession) -> Option<String> {
    let options = session.find_all(sel::ACTIVE_OPTION).await.ok()?;
    for option in options {
        if !option.is_displayed().await.unwrap_or(false) {
            continue;
        }
        if let Ok(text) = option.text().await {
            let text = text.trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Pick the option whose normalized text equals `text`. True when a click
/// landed.
pub async fn select_option_by_text(
    session: &BrowserSession,
    input_xpath: &str,
    text: &str,
) -> bool {
    if open_dropdown(session, input_xpath).await.is_err() {
        return false;
    }

    let xp = sel::option_with_text(text);
    let option = match session.wait_clickable(&xp, 10).await {
        Ok(option) => option,
        Err(_) => return false,
    };

    let _ = session
        .execute_json(SCROLL_NEAREST_SCRIPT, vec![serde_json::json!(&option)])
        .await;
    option.click().await.is_ok() || session.js_click(&option).await.is_ok()
}

/// Clear the input and type `value` followed by Enter. Clearing is layered:
/// element clear, Ctrl+A plus Backspace, then a script that resets the value
/// and fires input/change events.
pub async fn set_value_by_typing(
    session: &BrowserSession,
    input_xpath: &str,
    value: &str,
) -> Result<()> {
    let input = open_dropdown(session, input_xpath).await?;

    let _ = input.clear().await;
    let _ = input.send_keys(Key::Control + "a").await;
    let _ = input.send_keys(Key::Backspace).await;
    if let Ok(Some(current)) = input.prop("value").await {
        if !current.is_empty() {
            let _ = session
                .execute_json(CLEAR_INPUT_SCRIPT, vec![serde_json::json!(&input)])
                .await;
        }
    }

    input.send_keys(value).await?;
    input.send_keys(Key::Return).await?;
    Ok(())
}

/// Click the first real (non placeholder) visible option. Returns its text,
/// `Some("")` when only the blind ArrowDown+Enter fallback worked, `None`
/// when nothing could be selected.
pub async fn select_first_option(
    session: &BrowserSession,
    input_xpath: &str,
) -> Option<String> {
    if open_dropdown(session, input_xpath).await.is_err() {
        return None;
    }
    wait_for_options(session, 5).await;

    for option in visible_option_elements(session).await {
        let text = match option.text().await {
            Ok(text) => text.trim().to_string(),
            Err(_) => continue,
        };
        if text.is_empty() || text.to_lowercase().starts_with("selecione ") {
            continue;
        }
        let _ = session
            .execute_json(SCROLL_NEAREST_SCRIPT, vec![serde_json::json!(&option)])
            .await;
        if option.click().await.is_ok() || session.js_click(&option).await.is_ok() {
            return Some(text);
        }
    }

    if let Ok(input) = open_dropdown(session, input_xpath).await {
        if input.send_keys(Key::Down).await.is_ok() && input.send_keys(Key::Return).await.is_ok()
        {
            return Some(String::new());
        }
    }
    None
}

/// Full selection chain for one combobox value: type and confirm, fall back
/// to clicking the matching option, fall back to the first option. True when
/// anything ended up selected.
pub async fn select_value(session: &BrowserSession, input_xpath: &str, value: &str) -> bool {
    if set_value_by_typing(session, input_xpath, value).await.is_ok() {
        sleep(Duration::from_millis(300)).await;
        if session.input_value(input_xpath).await == value {
            return true;
        }
    }
    if select_option_by_text(session, input_xpath, value).await {
        return true;
    }
    select_first_option(session, input_xpath).await.is_some()
}

/// Dismiss any open option overlay so it cannot swallow the next click on
/// the submit button.
pub async fn close_overlays(session: &BrowserSession) {
    if visible_option_elements(session).await.is_empty() {
        return;
    }
    if let Ok(active) = session.driver().active_element().await {
        let _ = active.send_keys(Key::Escape).await;
    }
    sleep(Duration::from_millis(200)).await;
    if !visible_option_elements(session).await.is_empty() {
        let _ = session
            .execute_json("document.body && document.body.click();", vec![])
            .await;
    }
}

async fn wait_for_options(session: &BrowserSession, timeout_secs: u64) {
    let start = std::time::Instant::now();
    while start.elapsed() < Duration::from_secs(timeout_secs) {
        if !visible_option_elements(session).await.is_empty() {
            return;
        }
        sleep(Duration::from_millis(250)).await;
    }
}

async fn visible_option_elements(session: &BrowserSession) -> Vec<WebElement> {
    let mut visible = Vec::new();
    if let Ok(elements) = session.find_all(sel::VISIBLE_OPTIONS).await {
        for element in elements {
            if element.is_displayed().await.unwrap_or(false) {
                let text = element.text().await.unwrap_or_default();
                if !text.trim().is_empty() {
                    visible.push(element);
                }
            }
        }
    }
    visible
}

async fn visible_option_texts(session: &BrowserSession) -> Vec<String> {
    let mut texts = Vec::new();
    for element in visible_option_elements(session).await {
        if let Ok(text) = element.text().await {
            let text = text.trim().to_string();
            if !text.is_empty() {
                texts.push(text);
            }
        }
    }
    texts
}

/// Dedupe preserving first-seen order and drop placeholder entries.
pub fn normalize_options(texts: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for text in texts {
        let text = text.trim().to_string();
        if text.is_empty() || text.to_lowercase().starts_with("selecione ") {
            continue;
        }
        if seen.insert(text.clone()) {
            out.push(text);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn normalize_keeps_first_seen_order() {
        let input = owned(&["12.345.678", "04.696.227", "12.345.678", "04.696.227"]);
        assert_eq!(
            normalize_options(input),
            owned(&["12.345.678", "04.696.227"])
        );
    }

    #[test]
    fn normalize_drops_empty_and_placeholder_rows() {
        let input = owned(&[
            "",
            "   ",
            "Selecione uma opção",
            "SELECIONE o CNPJ",
            "2025",
        ]);
        assert_eq!(normalize_options(input), owned(&["2025"]));
    }

    #[test]
    fn normalize_only_drops_placeholder_prefix_with_space() {
        // "Selecione" with no following word is a real (if odd) option.
        let input = owned(&["Selecione", "Selecionemos 1"]);
        assert_eq!(
            normalize_options(input),
            owned(&["Selecione", "Selecionemos 1"])
        );
    }

    #[test]
    fn normalize_trims_before_comparing() {
        let input = owned(&[" 2025", "2025 ", "2026"]);
        assert_eq!(normalize_options(input), owned(&["2025", "2026"]));
    }
}

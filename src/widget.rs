//! Embeddable launcher script served at `/widget/{slug}.js`.

use std::collections::BTreeMap;

use minijinja::{context, Environment};
use serde::Serialize;
use tracing::warn;

use crate::types::{Agent, ButtonIcon, ButtonPosition, UiConfig, DEFAULT_HEADER_TITLE};

const WIDGET_TEMPLATE: &str = include_str!("templates/widget.js.j2");

const POSITIONS: [ButtonPosition; 4] = [
    ButtonPosition::BottomRight,
    ButtonPosition::BottomLeft,
    ButtonPosition::TopRight,
    ButtonPosition::TopLeft,
];

const ICONS: [ButtonIcon; 4] = [
    ButtonIcon::Message,
    ButtonIcon::Chat,
    ButtonIcon::Help,
    ButtonIcon::Support,
];

const CLOSE_ICON: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="18" height="18" viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2" stroke-linecap="round" stroke-linejoin="round"><line x1="18" y1="6" x2="6" y2="18"></line><line x1="6" y1="6" x2="18" y2="18"></line></svg>"#;

fn icon_svg(icon: ButtonIcon) -> &'static str {
    match icon {
        ButtonIcon::Message => {
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="24" height="24" viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2" stroke-linecap="round" stroke-linejoin="round"><path d="M21 15a2 2 0 0 1-2 2H7l-4 4V5a2 2 0 0 1 2-2h14a2 2 0 0 1 2 2z"/></svg>"#
        }
        ButtonIcon::Chat => {
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="24" height="24" viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2" stroke-linecap="round" stroke-linejoin="round"><path d="M7.9 20A9 9 0 1 0 4 16.1L2 22Z"/></svg>"#
        }
        ButtonIcon::Help => {
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="24" height="24" viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2" stroke-linecap="round" stroke-linejoin="round"><circle cx="12" cy="12" r="10"/><path d="M9.09 9a3 3 0 0 1 5.83 1c0 2-3 3-3 3"/><path d="M12 17h.01"/></svg>"#
        }
        ButtonIcon::Support => {
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="24" height="24" viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2" stroke-linecap="round" stroke-linejoin="round"><path d="M3 14h3a2 2 0 0 1 2 2v3a2 2 0 0 1-2 2H5a2 2 0 0 1-2-2v-7a9 9 0 0 1 18 0v7a2 2 0 0 1-2 2h-1a2 2 0 0 1-2-2v-3a2 2 0 0 1 2-2h3"/></svg>"#
        }
    }
}

/// Settings baked into the script. Without a saved config the header shows
/// the agent's name.
pub fn effective_ui_config(agent: &Agent, ui: Option<&UiConfig>) -> UiConfig {
    match ui {
        Some(config) => config.clone(),
        None => {
            let header_title = if agent.name.trim().is_empty() {
                DEFAULT_HEADER_TITLE.to_string()
            } else {
                agent.name.clone()
            };
            UiConfig {
                header_title,
                ..UiConfig::default()
            }
        }
    }
}

/// JSON that is safe to splice into script text: no value can close a
/// surrounding `<script>` element or end a line in older engines.
fn script_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace('<', "\\u003c")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

struct WidgetValues {
    defaults_json: String,
    positions_json: String,
    icons_json: String,
    base_url_json: String,
}

impl WidgetValues {
    fn new(base_url: &str, config: &UiConfig) -> Self {
        let positions = POSITIONS
            .iter()
            .map(|position| (position.as_str(), position.css_offsets()))
            .collect::<BTreeMap<_, _>>();
        let mut icons = ICONS
            .iter()
            .map(|icon| (icon.as_str(), icon_svg(*icon)))
            .collect::<BTreeMap<_, _>>();
        icons.insert("close", CLOSE_ICON);

        Self {
            defaults_json: script_json(config),
            positions_json: script_json(&positions),
            icons_json: script_json(&icons),
            base_url_json: script_json(&base_url.trim_end_matches('/')),
        }
    }
}

pub fn render_widget_script(base_url: &str, agent: &Agent, ui: Option<&UiConfig>) -> String {
    let config = effective_ui_config(agent, ui);
    let values = WidgetValues::new(base_url, &config);

    // No file extension in the name keeps auto-escaping off; every value is
    // already JSON.
    let mut env = Environment::new();
    if let Err(err) = env.add_template("widget", WIDGET_TEMPLATE) {
        warn!(error = %err, "widget template failed to compile");
        return fallback_widget_script(&values);
    }
    let Ok(template) = env.get_template("widget") else {
        return fallback_widget_script(&values);
    };
    template
        .render(context! {
            defaults_json => values.defaults_json,
            positions_json => values.positions_json,
            icons_json => values.icons_json,
            base_url_json => values.base_url_json,
        })
        .unwrap_or_else(|err| {
            warn!(slug = %agent.slug, error = %err, "widget template failed to render");
            fallback_widget_script(&values)
        })
}

fn fallback_widget_script(values: &WidgetValues) -> String {
    WIDGET_TEMPLATE
        .replace("{{ defaults_json }}", &values.defaults_json)
        .replace("{{ positions_json }}", &values.positions_json)
        .replace("{{ icons_json }}", &values.icons_json)
        .replace("{{ base_url_json }}", &values.base_url_json)
}

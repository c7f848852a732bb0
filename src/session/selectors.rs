//! CSS selectors of the block editor and login form

use serde::{Deserialize, Serialize};

/// Every element the publishing session interacts with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSelectors {
    /// Substring of the location that identifies the login page
    pub login_marker: String,
    pub login_username: String,
    pub login_password: String,
    pub login_submit: String,

    /// Editor options ("⋮") button
    pub options_button: String,
    /// Labels of the editor-mode menu entries
    pub mode_menu_items: String,
    /// Visible text of the raw (code) editor entry
    pub raw_mode_label: String,
    /// Button that closes the mode notice after switching
    pub mode_exit_button: String,

    pub title_field: String,
    pub content_field: String,

    pub publish_toggle: String,
    pub publish_confirm: String,

    pub copy_url_button: String,
    pub published_url_field: String,
}

impl Default for EditorSelectors {
    fn default() -> Self {
        Self {
            login_marker: "wp-login.php".into(),
            login_username: "#user_login".into(),
            login_password: "#user_pass".into(),
            login_submit: "#wp-submit".into(),
            options_button: r#"button[aria-label="옵션"]"#.into(),
            mode_menu_items: r#"button[role="menuitemradio"] span.components-menu-item__item"#
                .into(),
            raw_mode_label: "코드 편집기".into(),
            mode_exit_button: "button.is-tertiary".into(),
            title_field: "textarea#inspector-textarea-control-0".into(),
            content_field: "textarea#post-content-0".into(),
            publish_toggle: "button.components-button.editor-post-publish-panel__toggle.editor-post-publish-button__button.is-primary.is-compact".into(),
            publish_confirm: "button.components-button.editor-post-publish-button.editor-post-publish-button__button.is-primary.is-compact".into(),
            copy_url_button: "div.post-publish-panel__postpublish-post-address__copy-button-wrap > button.components-button.is-next-40px-default-size.is-secondary".into(),
            published_url_field: "input.components-text-control__input.is-next-40px-default-size#inspector-text-control-0".into(),
        }
    }
}

impl EditorSelectors {
    /// Whether `url` is the authentication page
    pub fn is_login_page(&self, url: &str) -> bool {
        url.contains(&self.login_marker)
    }
}

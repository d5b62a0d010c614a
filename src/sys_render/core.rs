//! List rendering. The `Renderer` trait is the seam the upload engine talks
//! through; `HtmlRenderer` produces the widget's `<ul>`/`<li>` markup.

use std::collections::HashMap;

use serde_json::Value;

use crate::sys_pathutil;
use crate::sys_registry::{FieldConfig, FieldStatus, RenderModel};

/// Presentation collaborator for an upload manager. One rendered list item
/// per attached file, keyed by the item token.
pub trait Renderer {
    /// A field was bound; set up its (empty) list.
    fn mount(&mut self, id: &str, config: &FieldConfig, class: &str);
    /// A file was attached; render its list item.
    fn attach_item(&mut self, id: &str, token: &str, file: &str, config: &FieldConfig, read_only: bool);
    /// A file was deleted; drop its list item.
    fn remove_item(&mut self, id: &str, token: &str);
    /// The advisory `full`/`unmet` flag changed or was recomputed.
    fn publish_status(&mut self, id: &str, status: FieldStatus);
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

struct FieldList {
    class: String,
    model: RenderModel,
    multi: u32,
    status: FieldStatus,
    items: Vec<(String, String)>,
}

/// In-memory HTML renderer. Holds one item list per field and can flatten
/// each to the markup the widget shows.
#[derive(Default)]
pub struct HtmlRenderer {
    lists: HashMap<String, FieldList>,
}

impl HtmlRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item_count(&self, id: &str) -> usize {
        self.lists.get(id).map(|l| l.items.len()).unwrap_or(0)
    }

    pub fn status(&self, id: &str) -> Option<FieldStatus> {
        self.lists.get(id).map(|l| l.status)
    }

    /// Flatten one field's list to its `<ul>` markup.
    pub fn render_list(&self, id: &str) -> String {
        let Some(list) = self.lists.get(id) else {
            return String::new();
        };
        let mut out = format!(
            r#"<ul class="{}" model="{}" multi="{}" limit="{}" data-file-list="{}">"#,
            html_escape(&list.class),
            match list.model {
                RenderModel::List => "list",
                RenderModel::Pics => "pics",
            },
            list.multi,
            list.status.as_str(),
            id,
        );
        for (_, html) in &list.items {
            out.push_str(html);
        }
        out.push_str("</ul>");
        out
    }

    fn build_item(
        id: &str,
        token: &str,
        file: &str,
        config: &FieldConfig,
        read_only: bool,
    ) -> String {
        let mut item = String::new();

        // Pics mode shows the image itself: as the item background when the
        // field holds several, inline when it holds one.
        let mut inline_img = String::new();
        let style = if config.model == RenderModel::Pics {
            if config.multi > 1 {
                format!(r#" style="background-image:url({})""#, html_escape(file))
            } else {
                inline_img = format!(r#"<img src="{}" />"#, html_escape(file));
                String::new()
            }
        } else {
            String::new()
        };

        item.push_str(&format!(r#"<li data-file-node="{token}"{style}>"#));
        item.push_str(&format!(
            "<var>{}</var>",
            html_escape(sys_pathutil::file_ext(file))
        ));
        if !read_only {
            item.push_str(&format!(
                r#"<del data-file-del="{}:{token}">&times;</del>"#,
                html_escape(id)
            ));
        }

        // Passthrough anchor attributes from the `attr` config object.
        let mut at = String::new();
        if let Some(Value::Object(attrs)) = config.extra.get("attr") {
            for (k, v) in attrs {
                let v = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                at.push_str(&format!(r#" {}="{}""#, k, html_escape(&v)));
            }
        }
        item.push_str(&format!(
            r#"<a href="{}" target="_blank"{}><ins>{}</ins>{}</a>"#,
            html_escape(file),
            at,
            html_escape(sys_pathutil::base_name(file)),
            inline_img,
        ));
        item.push_str("</li>");
        item
    }
}

impl Renderer for HtmlRenderer {
    fn mount(&mut self, id: &str, config: &FieldConfig, class: &str) {
        self.lists.insert(
            id.to_string(),
            FieldList {
                class: class.to_string(),
                model: config.model,
                multi: config.multi,
                status: FieldStatus::Unmet,
                items: Vec::new(),
            },
        );
    }

    fn attach_item(&mut self, id: &str, token: &str, file: &str, config: &FieldConfig, read_only: bool) {
        let html = Self::build_item(id, token, file, config, read_only);
        if let Some(list) = self.lists.get_mut(id) {
            list.items.push((token.to_string(), html));
        }
    }

    fn remove_item(&mut self, id: &str, token: &str) {
        if let Some(list) = self.lists.get_mut(id) {
            list.items.retain(|(t, _)| t != token);
        }
    }

    fn publish_status(&mut self, id: &str, status: FieldStatus) {
        if let Some(list) = self.lists.get_mut(id) {
            list.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pics_config(multi: u32) -> FieldConfig {
        let over = json!({ "multi": multi, "model": "pics" });
        FieldConfig::merged(over.as_object().unwrap()).unwrap()
    }

    #[test]
    fn list_item_carries_ext_name_and_delete_control() {
        let mut r = HtmlRenderer::new();
        let cfg = FieldConfig::default();
        r.mount("file1", &cfg, "uploads");
        r.attach_item("file1", "tok1", "/upload/pic.png", &cfg, false);
        let html = r.render_list("file1");
        assert!(html.contains("<var>png</var>"));
        assert!(html.contains("<ins>pic.png</ins>"));
        assert!(html.contains(r#"data-file-node="tok1""#));
        assert!(html.contains("<del"));
    }

    #[test]
    fn read_only_items_have_no_delete_control() {
        let mut r = HtmlRenderer::new();
        let cfg = FieldConfig::default();
        r.mount("file1", &cfg, "");
        r.attach_item("file1", "tok1", "a.png", &cfg, true);
        assert!(!r.render_list("file1").contains("<del"));
    }

    #[test]
    fn pics_mode_picks_background_or_inline_image() {
        let mut r = HtmlRenderer::new();
        let many = pics_config(4);
        r.mount("gallery", &many, "");
        r.attach_item("gallery", "t1", "a.png", &many, false);
        assert!(r.render_list("gallery").contains("background-image:url(a.png)"));

        let one = pics_config(1);
        r.mount("avatar", &one, "");
        r.attach_item("avatar", "t1", "a.png", &one, false);
        assert!(r.render_list("avatar").contains(r#"<img src="a.png" />"#));
    }

    #[test]
    fn remove_item_drops_only_that_token() {
        let mut r = HtmlRenderer::new();
        let cfg = FieldConfig::default();
        r.mount("file1", &cfg, "");
        r.attach_item("file1", "t1", "a.png", &cfg, false);
        r.attach_item("file1", "t2", "b.png", &cfg, false);
        r.remove_item("file1", "t1");
        assert_eq!(r.item_count("file1"), 1);
        assert!(r.render_list("file1").contains("b.png"));
        assert!(!r.render_list("file1").contains("a.png"));
    }

    #[test]
    fn status_flag_appears_on_the_list() {
        let mut r = HtmlRenderer::new();
        let cfg = FieldConfig::default();
        r.mount("file1", &cfg, "");
        r.publish_status("file1", FieldStatus::Full);
        assert!(r.render_list("file1").contains(r#"limit="full""#));
    }
}

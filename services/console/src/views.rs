//! Server-rendered HTML for the console pages.

use device_wizard::auth::OperatorIdentity;
use device_wizard::forms::{Form, FormErrors, FormField, InputKind, TypeChoice};
use device_wizard::idm::DeviceCredentials;
use std::fmt::Write;

/// Escape text for use in element content and quoted attributes.
pub(crate) fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Header data shared by every page.
pub(crate) struct Chrome<'a> {
    pub(crate) identity: &'a OperatorIdentity,
    pub(crate) account_url: &'a str,
    pub(crate) fiware_service: &'a str,
}

pub(crate) fn layout(chrome: &Chrome<'_>, title: &str, body: &str) -> String {
    let account = if chrome.account_url.is_empty() {
        escape(&chrome.identity.fullname)
    } else {
        format!(
            r#"<a href="{}">{}</a>"#,
            escape(chrome.account_url),
            escape(&chrome.identity.fullname)
        )
    };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>{title} | Device Wizard</title></head>
<body>
<header>
<nav>
<a href="/dashboard">Dashboard</a>
<a href="/device">Register device</a>
<a href="/iotdevice">Register IoT device</a>
<a href="/orion">Devices</a>
<a href="/iotagent">IoT devices</a>
<a href="/init">Initialise classes</a>
<a href="/help">Help</a>
<a href="/about">About</a>
</nav>
<p class="operator">{account} ({user}) &middot; service <code>{service}</code> &middot; <a href="/logout">Log out</a></p>
</header>
<main>
<h1>{title}</h1>
{body}
</main>
</body>
</html>
"#,
        title = escape(title),
        account = account,
        user = escape(&chrome.identity.user),
        service = escape(chrome.fiware_service),
        body = body,
    )
}

/// A page with a heading and a single message.
pub(crate) fn message(chrome: &Chrome<'_>, title: &str, text: &str) -> String {
    layout(chrome, title, &format!("<p>{}</p>", escape(text)))
}

pub(crate) fn unavailable(chrome: &Chrome<'_>, service: &str, url: &str) -> String {
    message(
        chrome,
        service,
        &format!("Could not connect to the {service}. URL: {url}"),
    )
}

pub(crate) fn not_found(chrome: &Chrome<'_>, path: &str) -> String {
    message(
        chrome,
        "Page not found",
        &format!("There is nothing at {path}."),
    )
}

pub(crate) struct DashboardView {
    pub(crate) orion_version: Option<String>,
    pub(crate) agent_version: Option<String>,
    pub(crate) idm_active: bool,
    pub(crate) registered_classes: Option<usize>,
    pub(crate) class_files: usize,
}

fn status_cell(value: Option<&str>) -> String {
    match value {
        Some(version) => escape(version),
        None => "unreachable".to_string(),
    }
}

pub(crate) fn dashboard(chrome: &Chrome<'_>, view: &DashboardView) -> String {
    let registered = view
        .registered_classes
        .map(|count| count.to_string())
        .unwrap_or_else(|| "-".to_string());
    let body = format!(
        r#"<table>
<tr><th>Orion LD</th><td>{orion}</td></tr>
<tr><th>IoT Agent</th><td>{agent}</td></tr>
<tr><th>Keycloak IDM</th><td>{idm}</td></tr>
<tr><th>Registered class entities</th><td>{registered}</td></tr>
<tr><th>Class files</th><td>{classes}</td></tr>
</table>"#,
        orion = status_cell(view.orion_version.as_deref()),
        agent = status_cell(view.agent_version.as_deref()),
        idm = if view.idm_active { "active" } else { "unreachable" },
        registered = registered,
        classes = view.class_files,
    );
    layout(chrome, "Dashboard", &body)
}

pub(crate) fn about(chrome: &Chrome<'_>) -> String {
    layout(
        chrome,
        "About",
        concat!(
            "<p>Device Wizard registers devices in an NGSI-LD context broker and an IoT agent, ",
            "and provisions MQTT credentials for them in the identity service.</p>",
            "<p>Version ",
            env!("CARGO_PKG_VERSION"),
            "</p>"
        ),
    )
}

pub(crate) fn help(chrome: &Chrome<'_>) -> String {
    layout(
        chrome,
        "Help",
        r#"<ol>
<li>Run <a href="/init">Initialise classes</a> once so relationship targets exist in the broker.</li>
<li>Pick a device type under <a href="/device">Register device</a> and fill in the form.</li>
<li>Copy the MQTT username, password and topic shown after registration. The password is not shown again.</li>
<li>IoT agent devices are registered under <a href="/iotdevice">Register IoT device</a>.</li>
</ol>"#,
    )
}

/// Type-selection list linking to `{action}?types={key}`.
pub(crate) fn select_type(
    chrome: &Chrome<'_>,
    title: &str,
    action: &str,
    choices: &[TypeChoice],
) -> String {
    let mut body = String::from("<ul class=\"types\">\n");
    for choice in choices {
        let _ = writeln!(
            body,
            r#"<li><a href="{action}?types={key}">{label}</a></li>"#,
            action = action,
            key = escape(&urlencoding::encode(&choice.key)),
            label = escape(&choice.label),
        );
    }
    body.push_str("</ul>");
    if choices.is_empty() {
        body = "<p>No device types are defined in the data model.</p>".to_string();
    }
    layout(chrome, title, &body)
}

fn render_field(field: &FormField, errors: Option<&FormErrors>) -> String {
    let name = escape(&field.name);
    let value = field.value.as_deref().unwrap_or_default();
    let mut flags = String::new();
    if field.required {
        flags.push_str(" required");
    }
    if field.readonly {
        flags.push_str(" readonly");
    }

    let control = match field.input {
        InputKind::Select => {
            let mut options = String::new();
            if !field.required {
                options.push_str("<option value=\"\"></option>");
            }
            for choice in &field.choices {
                let selected = if choice == value { " selected" } else { "" };
                let _ = write!(
                    options,
                    r#"<option value="{choice}"{selected}>{choice}</option>"#,
                    choice = escape(choice),
                    selected = selected,
                );
            }
            let disabled = if field.readonly { " disabled" } else { "" };
            format!(r#"<select id="{name}" name="{name}"{disabled}>{options}</select>"#)
        }
        InputKind::Checkbox => {
            let checked = if matches!(value, "true" | "y" | "yes" | "on" | "1") {
                " checked"
            } else {
                ""
            };
            format!(r#"<input type="checkbox" id="{name}" name="{name}" value="y"{checked}{flags}>"#)
        }
        input => {
            let step = match input {
                InputKind::Number => " step=\"any\"",
                InputKind::DateTime => " step=\"1\"",
                _ => "",
            };
            format!(
                r#"<input type="{kind}" id="{name}" name="{name}" value="{value}"{step}{flags}>"#,
                kind = input.html_type(),
                value = escape(value),
            )
        }
    };

    let mut messages = String::new();
    if let Some(errors) = errors {
        for message in errors.for_field(&field.name) {
            let _ = write!(messages, r#"<span class="error">{}</span>"#, escape(message));
        }
    }

    format!(
        r#"<p><label for="{name}">{label}</label> {control}{messages}</p>"#,
        label = escape(&field.label),
    )
}

pub(crate) fn form(
    chrome: &Chrome<'_>,
    form: &Form,
    action: &str,
    submit: &str,
    errors: Option<&FormErrors>,
) -> String {
    let mut body = format!(r#"<form method="post" action="{}">"#, escape(action));
    body.push('\n');
    for field in &form.fields {
        body.push_str(&render_field(field, errors));
        body.push('\n');
    }
    let _ = write!(
        body,
        r#"<p><button type="submit">{}</button></p></form>"#,
        escape(submit)
    );
    layout(chrome, &form.title, &body)
}

/// Outcome of a registration or update.
pub(crate) fn outcome(
    chrome: &Chrome<'_>,
    title: &str,
    entity_id: &str,
    failure: Option<&str>,
    credentials: Option<&DeviceCredentials>,
    warning: Option<&str>,
) -> String {
    let mut body = match failure {
        None => format!(
            "<p class=\"success\">Device <code>{}</code> was saved.</p>",
            escape(entity_id)
        ),
        Some(reason) => format!(
            "<p class=\"failure\">Device <code>{}</code> could not be saved.</p><p>Reason: {}</p>",
            escape(entity_id),
            escape(reason)
        ),
    };
    if let Some(credentials) = credentials {
        let _ = write!(
            body,
            r#"<table class="credentials">
<tr><th>MQTT user</th><td><code>{}</code></td></tr>
<tr><th>Password</th><td><code>{}</code></td></tr>
<tr><th>Topic</th><td><code>{}</code></td></tr>
</table>"#,
            escape(&credentials.username),
            escape(&credentials.password),
            escape(&credentials.topic),
        );
    }
    if let Some(warning) = warning {
        let _ = write!(body, "<p class=\"warning\">{}</p>", escape(warning));
    }
    layout(chrome, title, &body)
}

/// One row of a device listing.
pub(crate) struct DeviceRow {
    pub(crate) id: String,
    pub(crate) entity_type: String,
    pub(crate) category: Option<String>,
    pub(crate) mqtt_topic: String,
    pub(crate) mqtt_user: String,
    pub(crate) edit: Option<String>,
    pub(crate) delete: String,
}

const DELETE_SCRIPT: &str = r#"<script>
document.querySelectorAll("a[data-delete]").forEach(function (link) {
  link.addEventListener("click", function (event) {
    event.preventDefault();
    if (!confirm("Delete this device?")) { return; }
    fetch(link.dataset.delete).then(function () { window.location.reload(); });
  });
});
</script>"#;

/// The bare table, also served on its own by `/iotagentapi`.
pub(crate) fn device_table(rows: &[DeviceRow]) -> String {
    if rows.is_empty() {
        return "<p>No devices registered.</p>".to_string();
    }
    let mut table = String::from(
        "<table class=\"devices\">\n<tr><th>Id</th><th>Type</th><th>Category</th><th>MQTT topic</th><th>MQTT user</th><th></th></tr>\n",
    );
    for row in rows {
        let edit = row
            .edit
            .as_deref()
            .map(|href| format!(r#"<a href="{}">Edit</a> "#, escape(href)))
            .unwrap_or_default();
        let _ = writeln!(
            table,
            r##"<tr><td>{id}</td><td>{kind}</td><td>{category}</td><td><code>{topic}</code></td><td><code>{user}</code></td><td>{edit}<a href="#" data-delete="{delete}">Delete</a></td></tr>"##,
            id = escape(&row.id),
            kind = escape(&row.entity_type),
            category = escape(row.category.as_deref().unwrap_or_default()),
            topic = escape(&row.mqtt_topic),
            user = escape(&row.mqtt_user),
            edit = edit,
            delete = escape(&row.delete),
        );
    }
    table.push_str("</table>");
    table
}

pub(crate) fn device_list(chrome: &Chrome<'_>, title: &str, rows: &[DeviceRow]) -> String {
    let body = format!("{}\n{}", device_table(rows), DELETE_SCRIPT);
    layout(chrome, title, &body)
}

use crate::ledger::LedgerState;
use crate::render::{FieldEntry, NodeId, NodeKind, Template};
use crate::snapshot::Section;
use std::fmt::Write;

/// Renders a settled month as a static page.
pub fn render_page(state: &LedgerState, offset: i32) -> String {
    let overview = &state.overview;
    let trend = state
        .trend
        .as_ref()
        .map(|trend| {
            format!(
                r#"<span class="value">{}</span> <span class="diff {}">{}</span>"#,
                escape(&trend.average_display),
                trend.class.as_str(),
                escape(&trend.diff_display)
            )
        })
        .unwrap_or_else(|| r#"<span class="value muted">n/a</span>"#.to_string());

    let mut sections = String::new();
    for (section, root) in state.tree.sections() {
        render_section(&mut sections, state, section, root);
    }
    if sections.is_empty() {
        sections.push_str(r#"<p class="hint">Nothing recorded for this month.</p>"#);
    }

    INDEX_HTML
        .replace("{{MONTH}}", &escape(&overview.month_title))
        .replace("{{KEY}}", &escape(state.date.current()))
        .replace("{{PREV}}", &offset.saturating_sub(1).to_string())
        .replace("{{NEXT}}", &offset.saturating_add(1).to_string())
        .replace("{{PREV_CLASS}}", inactive(state.neighbours.previous))
        .replace("{{NEXT_CLASS}}", inactive(state.neighbours.next))
        .replace("{{INCOME}}", &escape(&overview.income))
        .replace("{{SHORT}}", &escape(&overview.short))
        .replace("{{SHORT_CLASS}}", overview.short_class)
        .replace("{{LEFT}}", &escape(&overview.left))
        .replace("{{TREND}}", &trend)
        .replace("{{SECTIONS}}", &sections)
}

fn inactive(exists: bool) -> &'static str {
    if exists { "nav" } else { "nav inactive" }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn render_section(out: &mut String, state: &LedgerState, section: Section, root: NodeId) {
    let overview = &state.overview;
    let header = match section {
        Section::Debt => format!("{}{}", section.title(), overview.debt_header),
        Section::ToPay => format!("{}{}", section.title(), overview.to_pay_header),
        Section::Notes if !overview.notes_header.is_empty() => overview.notes_header.clone(),
        _ => section.title(),
    };
    let _ = write!(out, r#"<section class="stat section {}"><h2>{}</h2><ul>"#, section.key(), escape(&header));
    render_children(out, state, root);
    out.push_str("</ul>");
    let total = match section {
        Section::Debt => Some(&overview.debt_total),
        Section::ToPay => Some(&overview.to_pay_total),
        _ => None,
    };
    if let Some(total) = total {
        let _ = write!(out, r#"<p class="total">{}</p>"#, escape(total));
    }
    out.push_str("</section>");
}

fn render_children(out: &mut String, state: &LedgerState, id: NodeId) {
    let Some(node) = state.tree.node(id) else {
        return;
    };
    for child in &node.children {
        render_node(out, state, *child);
    }
}

fn render_node(out: &mut String, state: &LedgerState, id: NodeId) {
    let Some(node) = state.tree.node(id) else {
        return;
    };
    match &node.kind {
        NodeKind::Section(_) => render_children(out, state, id),
        NodeKind::Group { title, template, .. } => {
            let _ = write!(
                out,
                r#"<li class="group {}"><h3>{}</h3><ul>"#,
                template_class(*template),
                escape(title)
            );
            render_children(out, state, id);
            out.push_str("</ul></li>");
        }
        NodeKind::Field(entry) => render_entry(out, state, id, entry),
        NodeKind::Slot { resolved: false, .. } => out.push_str(r#"<li class="pending">loading…</li>"#),
        NodeKind::Slot { .. } => render_children(out, state, id),
    }
}

fn template_class(template: Template) -> &'static str {
    match template {
        Template::Flat => "flat",
        Template::FlatWithInfo => "flat with-info",
        Template::NestedContainer => "nested",
        Template::NestedWithInfo => "nested with-info",
    }
}

fn render_entry(out: &mut String, state: &LedgerState, id: NodeId, entry: &FieldEntry) {
    let _ = write!(out, r#"<li class="entry {}" data-id="{id}">"#, escape(&entry.key_class));
    match &entry.link {
        Some(link) => {
            let _ = write!(
                out,
                r#"<a class="label" href="{}">{}</a>"#,
                escape(link),
                escape(&entry.display_key())
            );
        }
        None if !entry.key.is_empty() => {
            let _ = write!(out, r#"<span class="label">{}</span>"#, escape(&entry.display_key()));
        }
        None => {}
    }
    if !entry.nested {
        let _ = write!(
            out,
            r#"<span class="value">{}</span>"#,
            escape(&entry.display_value(&state.currency))
        );
    }
    if let Some(info) = &entry.info {
        let _ = write!(out, r#"<span class="info">{}</span>"#, escape(info));
    }
    if let Some(due) = &entry.due {
        let _ = write!(out, r#"<span class="due">{}</span>"#, escape(&due.text()));
    }
    if let Some(paid) = entry.paid {
        let checked = if paid { " checked" } else { "" };
        let _ = write!(out, r#"<input type="checkbox" class="paid" disabled{checked} />"#);
    }
    if entry.nested {
        out.push_str("<ul>");
        render_children(out, state, id);
        out.push_str("</ul>");
    }
    out.push_str("</li>");
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Finances · {{MONTH}}</title>
  <style>
    @import url('https://fonts.googleapis.com/css2?family=Space+Grotesk:wght@400;500;600&family=Fraunces:wght@600&display=swap');

    :root {
      --bg-1: #f8f3e6;
      --bg-2: #f5d3a7;
      --ink: #2b2a28;
      --accent: #ff6b4a;
      --accent-2: #2f4858;
      --card: rgba(255, 255, 255, 0.86);
      --shadow: 0 24px 60px rgba(47, 72, 88, 0.18);
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      min-height: 100vh;
      background: radial-gradient(circle at top, var(--bg-2), transparent 60%),
        linear-gradient(135deg, var(--bg-1), #ffe9d4 60%, #f9f2e9 100%);
      color: var(--ink);
      font-family: "Space Grotesk", "Trebuchet MS", sans-serif;
      display: grid;
      place-items: center;
      padding: 32px 18px 48px;
    }

    .app {
      width: min(960px, 100%);
      background: var(--card);
      backdrop-filter: blur(12px);
      border-radius: 28px;
      box-shadow: var(--shadow);
      padding: 36px;
      display: grid;
      gap: 28px;
    }

    header {
      display: flex;
      align-items: center;
      justify-content: space-between;
      gap: 16px;
    }

    h1 {
      font-family: "Fraunces", "Georgia", serif;
      font-weight: 600;
      font-size: clamp(2rem, 4vw, 2.8rem);
      margin: 0;
    }

    .subtitle,
    .hint {
      margin: 0;
      color: #5f5c57;
    }

    .nav {
      color: var(--accent-2);
      font-weight: 600;
      text-decoration: none;
      font-size: 1.6rem;
    }

    .nav.inactive {
      opacity: 0.35;
    }

    .panel,
    .sections {
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(200px, 1fr));
      gap: 16px;
    }

    .stat {
      background: white;
      border-radius: 18px;
      padding: 18px;
      border: 1px solid rgba(47, 72, 88, 0.08);
      display: grid;
      gap: 8px;
      align-content: start;
    }

    .stat .label {
      font-size: 0.85rem;
      text-transform: uppercase;
      letter-spacing: 0.12em;
      color: #8b857d;
    }

    .stat .value {
      font-size: 1.2rem;
      font-weight: 600;
      color: var(--accent-2);
    }

    .panel .value {
      font-size: 1.7rem;
    }

    .plus {
      color: #2d7a4b;
    }

    .minus,
    .negative {
      color: #c63b2b;
    }

    .muted {
      color: #8b857d;
    }

    h2 {
      margin: 0;
      font-size: 1.2rem;
    }

    h3 {
      margin: 8px 0 4px;
      font-size: 0.95rem;
      color: #6b645d;
    }

    ul {
      list-style: none;
      margin: 0;
      padding: 0 0 0 8px;
      display: grid;
      gap: 4px;
    }

    .entry {
      display: flex;
      flex-wrap: wrap;
      gap: 8px;
      align-items: baseline;
    }

    .entry .info,
    .entry .due {
      font-size: 0.8rem;
      color: #8b857d;
    }

    .total {
      margin: 0;
      font-weight: 600;
      color: var(--accent);
    }

    .pending {
      color: #8b857d;
    }
  </style>
</head>
<body>
  <main class="app">
    <header>
      <a class="{{PREV_CLASS}}" href="/?offset={{PREV}}">&larr;</a>
      <div>
        <h1>{{MONTH}}</h1>
        <p class="subtitle">{{KEY}}</p>
      </div>
      <a class="{{NEXT_CLASS}}" href="/?offset={{NEXT}}">&rarr;</a>
    </header>

    <section class="panel">
      <div class="stat">
        <span class="label">Income</span>
        <span class="value">{{INCOME}}</span>
      </div>
      <div class="stat">
        <span class="label">Short</span>
        <span class="value {{SHORT_CLASS}}">{{SHORT}}</span>
      </div>
      <div class="stat">
        <span class="label">Left to pay</span>
        <span class="value">{{LEFT}}</span>
      </div>
      <div class="stat">
        <span class="label">Average to pay</span>
        <span>{{TREND}}</span>
      </div>
    </section>

    <section class="sections">
      {{SECTIONS}}
    </section>
  </main>
</body>
</html>
"#;

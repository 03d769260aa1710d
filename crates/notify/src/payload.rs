use fourmi_engine::{AnalysisResult, StatusColor};
use fourmi_report::ReportIndex;

/// SMS bodies are clamped to a single gateway segment.
pub const SMS_MAX_CHARS: usize = 160;

/// The rendered notification in every shape the sinks need.
#[derive(Debug, Clone)]
pub struct Payload {
    pub subject: String,
    pub text: String,
    pub html: String,
    pub sms: String,
}

/// Render the monthly summary from the analysis and the written report set.
pub fn build(analysis: &AnalysisResult, index: &ReportIndex) -> Payload {
    Payload {
        subject: subject(analysis),
        text: text_body(analysis, index),
        html: html_body(analysis, index),
        sms: sms_body(analysis),
    }
}

fn subject(analysis: &AnalysisResult) -> String {
    let b = &analysis.budget;
    match b.color {
        StatusColor::Red => format!(
            "{} ALERTE Budget {} dépassé de {}",
            b.color.emoji(),
            analysis.window,
            b.remaining.abs()
        ),
        _ => format!(
            "{} Budget {} : {} restants",
            b.color.emoji(),
            analysis.window,
            b.remaining
        ),
    }
}

fn sms_body(analysis: &AnalysisResult) -> String {
    let b = &analysis.budget;
    let mut line = format!(
        "{} Variables {} / {} ({:.0} %). Reste {}. Jour {}/{}.",
        b.color.emoji(),
        b.total_variable,
        b.budget_max,
        b.percentage,
        b.remaining,
        analysis.window.day(),
        analysis.window.last_day()
    );
    if let Some(advice) = b.advice.first() {
        line.push(' ');
        line.push_str(advice);
    }
    clamp_sms(&line)
}

/// Truncate to the gateway segment size on a character boundary, with an
/// ellipsis when something was dropped.
pub fn clamp_sms(text: &str) -> String {
    if text.chars().count() <= SMS_MAX_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(SMS_MAX_CHARS - 1).collect();
    out.push('…');
    out
}

fn text_body(analysis: &AnalysisResult, index: &ReportIndex) -> String {
    let mut out = String::new();
    for line in &analysis.budget.advice {
        out.push_str(line);
        out.push('\n');
    }
    for alert in &analysis.family_alerts {
        out.push_str("⚠️ ");
        out.push_str(alert);
        out.push('\n');
    }
    for missing in &analysis.missing_members {
        out.push_str(&format!(
            "Prélèvement attendu non vu : {} ({})\n",
            missing.member, missing.family
        ));
    }
    out.push('\n');
    out.push_str(&format!("Rapport complet : {}\n", index.index_url));
    for family in &index.families {
        out.push_str(&format!(
            "- {} : {} ({} op.) {}\n",
            family.name, family.total, family.transaction_count, family.url
        ));
    }
    out.push_str(&format!(
        "\nFixes : {} · Variables : {} · Total : {}\n",
        analysis.total_fixed, analysis.total_variable, analysis.total
    ));
    out
}

fn bar(percentage: f64, color: &str) -> String {
    let width = percentage.clamp(0.0, 100.0);
    format!(
        r#"<div style="background:#e0e0e0;border-radius:4px;height:10px;margin:4px 0"><div style="background:{color};width:{width:.0}%;height:10px;border-radius:4px"></div></div>"#
    )
}

fn html_body(analysis: &AnalysisResult, index: &ReportIndex) -> String {
    let b = &analysis.budget;
    let mut body = format!(
        r#"<div style="font-family:-apple-system,'Segoe UI',sans-serif;max-width:40em">
<h2>{} Dépenses {}</h2>
<p>Variables : <b>{}</b> sur {} ({:.0} %)</p>
{}
<p>Mois écoulé : {:.0} %</p>
{}
"#,
        b.color.emoji(),
        analysis.window,
        b.total_variable,
        b.budget_max,
        b.percentage,
        bar(b.percentage, b.color.css()),
        b.month_progress,
        bar(b.month_progress, "#90a4ae"),
    );

    for line in &b.advice {
        body.push_str(&format!("<p>{}</p>\n", escape(line)));
    }
    for alert in &analysis.family_alerts {
        body.push_str(&format!("<p>⚠️ {}</p>\n", escape(alert)));
    }

    body.push_str("<table style=\"border-collapse:collapse\">\n");
    for family in &index.families {
        body.push_str(&format!(
            "<tr><td style=\"padding:2px 8px\"><a href=\"{}\">{}</a></td><td style=\"padding:2px 8px;text-align:right\">{}</td></tr>\n",
            family.url,
            escape(&family.name),
            family.total,
        ));
    }
    body.push_str("</table>\n");

    body.push_str(&format!(
        "<p><a href=\"{}\">Rapport complet</a> · Fixes {} · Variables {} · Total {}</p>\n</div>\n",
        index.index_url, analysis.total_fixed, analysis.total_variable, analysis.total,
    ));
    body
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

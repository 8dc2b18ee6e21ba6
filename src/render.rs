//! Report rendering: narrative + metrics → a self-contained HTML document.
//!
//! Pure function of the report fields; no external calls, no state.

use std::fmt::Write as _;

use crate::metrics::ReportMetrics;
use crate::types::{InsightSeverity, NarrativeReport, Priority};
use crate::week::WeekWindow;

const STYLE: &str = "\
body{font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;\
line-height:1.6;color:#333;max-width:800px;margin:0 auto;padding:20px;background:#f5f5f5}\
.report-header{background:linear-gradient(135deg,#667eea 0%,#764ba2 100%);color:#fff;\
padding:30px;border-radius:12px;margin-bottom:20px}\
.report-title{font-size:28px;font-weight:bold;margin:0 0 10px 0}\
.week-period{font-size:14px;opacity:.9}\
.section{background:#fff;padding:20px;border-radius:12px;margin-bottom:20px;\
box-shadow:0 2px 4px rgba(0,0,0,.1)}\
.section-title{font-size:20px;font-weight:bold;color:#667eea;margin-bottom:15px}\
.insight{padding:15px;margin-bottom:10px;border-radius:8px;border-left:4px solid}\
.insight.positive{background:#f0fdf4;border-color:#10b981}\
.insight.negative{background:#fef2f2;border-color:#ef4444}\
.insight.neutral{background:#f0f9ff;border-color:#3b82f6}\
.insight-title{font-weight:600;margin-bottom:5px}\
.recommendation{padding:15px;margin-bottom:10px;background:#fafafa;border-radius:8px;\
border-left:3px solid #667eea}\
.priority-badge{display:inline-block;padding:2px 8px;border-radius:4px;font-size:12px;\
font-weight:600;margin-left:10px}\
.priority-high{background:#fecaca;color:#991b1b}\
.priority-medium{background:#fed7aa;color:#9a3412}\
.priority-low{background:#bfdbfe;color:#1e3a8a}\
.metrics-grid{display:grid;grid-template-columns:repeat(auto-fit,minmax(150px,1fr));\
gap:15px;margin-top:15px}\
.metric-card{background:#f8fafc;padding:15px;border-radius:8px;text-align:center}\
.metric-value{font-size:24px;font-weight:bold;color:#667eea}\
.metric-label{font-size:12px;color:#64748b;margin-top:5px}";

fn severity_class(severity: InsightSeverity) -> &'static str {
    match severity {
        InsightSeverity::Positive => "positive",
        InsightSeverity::Neutral => "neutral",
        InsightSeverity::Negative => "negative",
    }
}

fn priority_class(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "high",
        Priority::Medium => "medium",
        Priority::Low => "low",
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Render the in-app display document for a weekly report.
pub fn render_html(week: &WeekWindow, narrative: &NarrativeReport, metrics: &ReportMetrics) -> String {
    let mut html = String::with_capacity(4096);

    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
         <style>{STYLE}</style>\n</head>\n<body>\n\
         <div class=\"report-header\">\n\
         <div class=\"report-title\">{title}</div>\n\
         <div class=\"week-period\">{start} to {end}</div>\n</div>\n",
        title = escape(&narrative.title),
        start = week.start,
        end = week.end,
    );

    let _ = write!(
        html,
        "<div class=\"section\">\n<div class=\"section-title\">Summary</div>\n<p>{}</p>\n</div>\n",
        escape(&narrative.summary)
    );

    html.push_str("<div class=\"section\">\n<div class=\"section-title\">Key Insights</div>\n");
    for insight in &narrative.insights {
        let _ = write!(
            html,
            "<div class=\"insight {class}\">\n\
             <div class=\"insight-title\">{title}</div>\n<div>{description}</div>\n</div>\n",
            class = severity_class(insight.severity),
            title = escape(&insight.title),
            description = escape(&insight.description),
        );
    }
    html.push_str("</div>\n");

    html.push_str("<div class=\"section\">\n<div class=\"section-title\">Recommendations</div>\n");
    for rec in &narrative.recommendations {
        let _ = write!(
            html,
            "<div class=\"recommendation\">\n<div><strong>{action}</strong>\
             <span class=\"priority-badge priority-{class}\">{class}</span></div>\n\
             <div style=\"margin-top:8px;color:#666;font-size:14px\">{reasoning}</div>\n</div>\n",
            action = escape(&rec.action),
            class = priority_class(rec.priority),
            reasoning = escape(&rec.reasoning),
        );
    }
    html.push_str("</div>\n");

    let improvement = metrics
        .improvement_vs_last_week
        .map(|p| format!("{p:+.1}%"))
        .unwrap_or_else(|| "n/a".to_string());
    let _ = write!(
        html,
        "<div class=\"section\">\n<div class=\"section-title\">This Week's Metrics</div>\n\
         <div class=\"metrics-grid\">\n\
         <div class=\"metric-card\"><div class=\"metric-value\">{total}</div>\
         <div class=\"metric-label\">Images Uploaded</div></div>\n\
         <div class=\"metric-card\"><div class=\"metric-value\">{confidence:.0}%</div>\
         <div class=\"metric-label\">Avg Confidence</div></div>\n\
         <div class=\"metric-card\"><div class=\"metric-value\">{improvement}</div>\
         <div class=\"metric-label\">Change vs Last Week</div></div>\n\
         <div class=\"metric-card\"><div class=\"metric-value\">{days}</div>\
         <div class=\"metric-label\">Days Tracked</div></div>\n\
         </div>\n</div>\n",
        total = metrics.total_observations,
        confidence = metrics.average_confidence * 100.0,
        improvement = improvement,
        days = metrics.days_tracked,
    );

    if !narrative.next_steps.is_empty() {
        let _ = write!(
            html,
            "<div class=\"section\">\n<div class=\"section-title\">Next Steps</div>\n<p>{}</p>\n</div>\n",
            escape(&narrative.next_steps)
        );
    }

    html.push_str("</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::METRICS_SCHEMA_VERSION;
    use crate::trend::Trend;
    use crate::types::{Insight, Recommendation};
    use chrono::NaiveDate;

    fn sample_narrative() -> NarrativeReport {
        NarrativeReport {
            title: "Week of Progress".to_string(),
            summary: "Your skin held steady <this week>.".to_string(),
            insights: vec![Insight {
                title: "Consistency".to_string(),
                description: "Three tracked days".to_string(),
                severity: InsightSeverity::Positive,
            }],
            recommendations: vec![Recommendation {
                category: "lifestyle".to_string(),
                action: "Keep moisturizing".to_string(),
                priority: Priority::High,
                reasoning: "Dry patches recur without it".to_string(),
            }],
            next_steps: "Photograph daily".to_string(),
        }
    }

    fn sample_metrics() -> ReportMetrics {
        ReportMetrics {
            schema_version: METRICS_SCHEMA_VERSION,
            dominant_label: Some("eczema".to_string()),
            average_severity: None,
            average_confidence: 0.7,
            improvement_vs_last_week: Some(12.5),
            trend: Trend::Improving,
            total_observations: 3,
            days_tracked: 3,
            consistent_tracking: true,
        }
    }

    #[test]
    fn rendered_document_contains_every_section() {
        let week = WeekWindow::containing(NaiveDate::from_ymd_opt(2024, 6, 12).unwrap());
        let html = render_html(&week, &sample_narrative(), &sample_metrics());

        assert!(html.contains("Week of Progress"));
        assert!(html.contains("2024-06-10 to 2024-06-16"));
        assert!(html.contains("insight positive"));
        assert!(html.contains("priority-high"));
        assert!(html.contains("+12.5%"));
        assert!(html.contains("Photograph daily"));
    }

    #[test]
    fn rendering_is_a_pure_function_of_its_inputs() {
        let week = WeekWindow::containing(NaiveDate::from_ymd_opt(2024, 6, 12).unwrap());
        let a = render_html(&week, &sample_narrative(), &sample_metrics());
        let b = render_html(&week, &sample_narrative(), &sample_metrics());
        assert_eq!(a, b);
    }

    #[test]
    fn narrative_text_is_html_escaped() {
        let week = WeekWindow::containing(NaiveDate::from_ymd_opt(2024, 6, 12).unwrap());
        let html = render_html(&week, &sample_narrative(), &sample_metrics());
        assert!(html.contains("&lt;this week&gt;"));
        assert!(!html.contains("<this week>"));
    }
}

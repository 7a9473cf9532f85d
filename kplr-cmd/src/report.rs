use anyhow::{Context, Result};
use handlebars::handlebars_helper;
use kplr::dataset::Report;
use serde::Serialize;
use std::{
    io::{stdout, Write},
    path::Path,
};

#[derive(Debug, Clone)]
pub enum Format {
    Json,
    Text,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Json, Self::Text]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Json => Some(clap::builder::PossibleValue::new("json")),
            Self::Text => Some(clap::builder::PossibleValue::new("text")),
        }
    }
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    filename: String,
    duration: Option<f64>,
    anomalies: Vec<String>,
    report: &'a Report,
}

pub fn print(fpath: &Path, report: &Report, format: &Format) -> Result<()> {
    match format {
        Format::Json => {
            serde_json::to_writer_pretty(stdout(), report).context("serializing to json")
        }
        Format::Text => {
            let summary = Summary {
                filename: fpath.to_string_lossy().to_string(),
                duration: report
                    .first_time
                    .zip(report.last_time)
                    .map(|(first, last)| last - first),
                anomalies: report.anomalies.iter().map(ToString::to_string).collect(),
                report,
            };
            let data = render_text(&summary).context("serializing report")?;
            stdout()
                .write_all(str::as_bytes(&data))
                .context("writing to stdout")
        }
    }
}

fn render_text(summary: &Summary) -> Result<String> {
    handlebars_helper!(left_pad: |num: u64, v: Json| {
        let v = match v {
            serde_json::Value::String(s) => s.to_owned(),
            serde_json::Value::Null => String::new(),
            _ => v.to_string()
        };
        let width = usize::try_from(num).unwrap_or_default().max(v.len());
        format!("{v:>width$}")
    });
    let mut hb = handlebars::Handlebars::new();
    hb.register_escape_fn(handlebars::no_escape);
    hb.register_helper("lpad", Box::new(left_pad));
    hb.register_template_string("report", TEXT_TEMPLATE)
        .context("compiling text template")?;

    hb.render("report", summary).context("rendering text")
}

const TEXT_TEMPLATE: &str = r"{{ filename }}
===============================================================================
Packets:      {{ report.packets }} ({{ report.fill_packets }} fill, {{ report.invalid_packets }} invalid)
Data sets:    {{ report.data_sets }}
SCT entries:  {{ len report.sct_entries }}
First:        {{ report.first_time }}
Last:         {{ report.last_time }}
Duration:     {{ duration }}
Encoded runs: {{ #each report.statistics.encoded_runs }}{{ this }}{{ #if @last }}{{ else }}, {{ /if }}{{ /each }}
-------------------------------------------------------------------------------
Product                        Packets   Data sets
-------------------------------------------------------------------------------
{{ #each report.statistics.packets }}{{ lpad 22 @key }}  {{ lpad 13 this }}  {{ lpad 10 (lookup ../report.statistics.data_sets @key) }}
{{/each }}
{{ #if anomalies }}-------------------------------------------------------------------------------
Anomalies
-------------------------------------------------------------------------------
{{ #each anomalies }}{{ this }}
{{/each }}{{ /if }}";

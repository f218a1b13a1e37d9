use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::heatmap::Heatmap;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    /// Prints one line per placed day with its grid position and slice statistics.
    #[tracing::instrument(skip(self, heatmap))]
    pub fn print_summary(&mut self, heatmap: &Heatmap) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let paint = self.color && io::stdout().is_terminal();
        self.write_summary(&mut out, heatmap, paint)
    }

    pub fn write_summary<W: Write>(
        &self,
        mut out: W,
        heatmap: &Heatmap,
        paint: bool,
    ) -> anyhow::Result<()> {
        let headers = vec![
            "Date".to_string(),
            "Row".to_string(),
            "Col".to_string(),
            "Samples".to_string(),
            "Min".to_string(),
            "Mean".to_string(),
            "Max".to_string(),
        ];

        let mut rows = Vec::with_capacity(heatmap.days.len());
        for (cell, day) in heatmap.placed_days() {
            let (min, mean, max) = slice_stats(&day.values);
            let date = cell.date.format("%Y-%m-%d %a").to_string();
            let date = if day.sample_count == 0 && paint {
                paint_code(&date, "2")
            } else {
                date
            };

            rows.push(vec![
                date,
                cell.row.to_string(),
                cell.column.to_string(),
                day.sample_count.to_string(),
                format!("{min:.2}"),
                format!("{mean:.2}"),
                format!("{max:.2}"),
            ]);
        }

        write_table(&mut out, headers, rows)?;

        let g = &heatmap.layout.geometry;
        writeln!(
            out,
            "{} days, {} rows, {}x{} px, reducer {}",
            heatmap.days.len(),
            heatmap.layout.row_count,
            g.image_width,
            g.image_height,
            heatmap.reducer
        )?;
        if !heatmap.caption.is_empty() {
            writeln!(out, "{}", heatmap.caption)?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, cfg))]
    pub fn print_config(&mut self, cfg: &Config) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let mut entries: Vec<(&String, &String)> = cfg.iter().collect();
        entries.sort();

        let rows = entries
            .into_iter()
            .map(|(k, v)| vec![k.clone(), v.clone()])
            .collect();
        write_table(&mut out, vec!["Key".to_string(), "Value".to_string()], rows)
    }
}

fn slice_stats(values: &[f64]) -> (f64, f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    (min, mean, max)
}

fn paint_code(text: &str, code: &str) -> String {
    format!("\x1b[{code}m{text}\x1b[0m")
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

use crate::config::RunConfig;
use crate::error::Result;
use plotters::prelude::*;
use serde::Serialize;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// 1イテレーション分の学習メトリクス。
///
/// 物理損失 (`IC`/`PDE`) は PDE 損失の重みが 0 の場合は計算しないため `None` になります。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub iteration: usize,
    #[serde(rename = "train loss")]
    pub train_loss: f64,
    pub data: f64,
    #[serde(rename = "IC", skip_serializing_if = "Option::is_none")]
    pub ic: Option<f64>,
    #[serde(rename = "PDE", skip_serializing_if = "Option::is_none")]
    pub pde: Option<f64>,
    #[serde(rename = "val error", skip_serializing_if = "Option::is_none")]
    pub val_error: Option<f64>,
    pub lr: f64,
}

impl LogRecord {
    pub fn new(iteration: usize, train_loss: f64, data: f64) -> Self {
        Self {
            iteration,
            train_loss,
            data,
            ic: None,
            pde: None,
            val_error: None,
            lr: 0.0,
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "train loss: {:.5}, data: {:.5}", self.train_loss, self.data)?;
        if let Some(ic) = self.ic {
            write!(f, ", IC: {ic:.5}")?;
        }
        if let Some(pde) = self.pde {
            write!(f, ", PDE: {pde:.5}")?;
        }
        if let Some(val) = self.val_error {
            write!(f, ", val error: {val:.5}")?;
        }
        Ok(())
    }
}

/// 学習メトリクスの転送先。
pub trait MetricTracker {
    fn log(&mut self, record: &LogRecord) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// 何も記録しないトラッカー (`--log` 未指定時)。
#[derive(Debug, Default)]
pub struct NullTracker;

impl MetricTracker for NullTracker {
    fn log(&mut self, _record: &LogRecord) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct RunHeader<'a> {
    project: Option<&'a str>,
    entity: Option<&'a str>,
    group: Option<&'a str>,
    config: &'a RunConfig,
}

/// メトリクスを JSON Lines 形式でファイルに追記するトラッカー。
///
/// 先頭行に実行の識別情報と設定全体、以降は1イテレーションごとに1行を書き出します。
pub struct JsonlTracker {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl JsonlTracker {
    pub fn create(dir: &Path, config: &RunConfig) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join("metrics.jsonl");
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);

        let header = RunHeader {
            project: config.log.project.as_deref(),
            entity: config.log.entity.as_deref(),
            group: config.log.group.as_deref(),
            config,
        };
        serde_json::to_writer(&mut writer, &header)?;
        writeln!(writer)?;
        tracing::info!("メトリクスを '{}' に記録します", path.display());

        Ok(Self { writer, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricTracker for JsonlTracker {
    fn log(&mut self, record: &LogRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        writeln!(self.writer)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// 学習過程の損失をグラフとしてPNGファイルに出力します。
pub fn plot_loss_history(
    history: &[LogRecord],
    path: &Path,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let log_points = |value: fn(&LogRecord) -> Option<f64>| -> Vec<(usize, f64)> {
        history
            .iter()
            .filter_map(|r| {
                value(r)
                    .filter(|v| v.is_finite() && *v > 0.0)
                    .map(|v| (r.iteration, v.log10()))
            })
            .collect()
    };
    let total = log_points(|r| Some(r.train_loss));
    let data = log_points(|r| Some(r.data));
    let pde = log_points(|r| r.pde);

    let (min_log_loss, max_log_loss) = total
        .iter()
        .chain(&data)
        .chain(&pde)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, v)| {
            (lo.min(v), hi.max(v))
        });
    if !min_log_loss.is_finite() {
        return Err("描画できる損失値がありません".into());
    }
    let last_iteration = history.last().map_or(1, |r| r.iteration.max(1));

    let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Loss History", ("sans-serif", 40).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(
            0..last_iteration + 1,
            (min_log_loss - 0.5)..(max_log_loss + 0.5),
        )?;
    chart
        .configure_mesh()
        .y_desc("Loss (log10 scale)")
        .x_desc("Iteration")
        .draw()?;

    for (points, label, color) in [
        (total, "Total Loss", RED),
        (data, "Data Loss", BLUE),
        (pde, "PDE Loss", GREEN),
    ] {
        if points.is_empty() {
            continue;
        }
        chart
            .draw_series(LineSeries::new(points, &color))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

use crate::training::LossRecord;
use plotters::prelude::*;
use std::path::Path;

/// 学習過程の損失をグラフとしてPNGファイルに出力します。
///
/// フェーズBの開始位置に縦線を引きます。非有限な損失は描画しません。
pub fn plot_loss_history(
    record: &LossRecord,
    phase_b_start: usize,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let points: Vec<(usize, f64)> = record
        .entries()
        .iter()
        .filter(|(_, loss)| loss.is_finite() && *loss > 0.0)
        .map(|&(epoch, loss)| (epoch, loss.log10()))
        .collect();
    if points.is_empty() {
        return Err("描画できる損失がありません".into());
    }

    let max_epoch = points.iter().map(|p| p.0).max().unwrap_or(0) + 1;
    let max_log_loss = points.iter().map(|p| p.1).fold(f64::MIN, f64::max) + 0.5;
    let min_log_loss = points.iter().map(|p| p.1).fold(f64::MAX, f64::min) - 0.5;

    let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Loss History", ("sans-serif", 40).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0..max_epoch, min_log_loss..max_log_loss)?;
    chart
        .configure_mesh()
        .y_desc("Loss (log10 scale)")
        .x_desc("Epoch")
        .draw()?;
    chart
        .draw_series(LineSeries::new(points, &RED))?
        .label("Total Loss")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));
    chart
        .draw_series(LineSeries::new(
            vec![(phase_b_start, min_log_loss), (phase_b_start, max_log_loss)],
            &BLUE,
        ))?
        .label("L-BFGS start")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

pub mod table;
pub mod json;

use crate::rotation::CycleReport;

pub fn print_cycle(report: &CycleReport, json_output: bool) {
    if json_output {
        println!("{}", json::render_cycle(report));
    } else {
        print!("{}", table::render_cycle(report));
        println!("\ncycle completed in {:.2}s", report.duration_ms as f64 / 1000.0);
    }
}

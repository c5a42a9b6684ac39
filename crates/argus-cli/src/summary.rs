use std::time::Duration;

use console::Style;

use argus_core::config::Config;
use argus_core::pipeline::{JobRecord, JobStatus, PipelineStats};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    good: Style,
    skip: Style,
    bad: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            good: Style::new().green(),
            skip: Style::new().yellow(),
            bad: Style::new().red(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_run_header(config: &Config, date: &str, jobs: usize) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Argus Pipeline"));
    println!("  {}", s.title.apply_to("\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}"));
    println!();
    println!("  {:<14}{}", s.label.apply_to("Date"), s.value.apply_to(date));
    println!("  {:<14}{}", s.label.apply_to("Observations"), s.value.apply_to(jobs));
    println!(
        "  {:<14}{}",
        s.label.apply_to("Downloads"),
        s.path.apply_to(config.download_root.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Templates"),
        s.path.apply_to(config.template_dir.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(config.diff_root.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Workers"),
        s.value.apply_to(config.thread_count)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Solver"),
        match &config.solver {
            Some(solver) => s.value.apply_to(solver.binary.display().to_string()),
            None => s.skip.apply_to("disabled".to_string()),
        }
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Alignment"),
        s.value.apply_to(config.alignment)
    );
    println!();
}

pub fn print_run_summary(records: &[JobRecord], stats: &PipelineStats, elapsed: Duration) {
    let s = Styles::new();

    println!();
    println!("  {}", s.header.apply_to("Results"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Done"),
        s.good.apply_to(stats.done)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Skipped"),
        s.skip.apply_to(stats.skipped)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Failed"),
        s.bad.apply_to(stats.failed)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Downloaded"),
        s.value
            .apply_to(format!("{:.1} MB", stats.bytes_downloaded as f64 / (1024.0 * 1024.0)))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Elapsed"),
        s.value.apply_to(format!("{:.1}s", elapsed.as_secs_f64()))
    );

    let failures: Vec<&JobRecord> = records
        .iter()
        .filter(|r| matches!(r.status, JobStatus::Failed { .. }))
        .collect();
    if !failures.is_empty() {
        println!();
        println!("  {}", s.header.apply_to("Failures"));
        for record in failures {
            println!(
                "    {} {}",
                s.bad.apply_to(&record.filename),
                s.label.apply_to(record.status.to_string())
            );
        }
    }
    println!();
}

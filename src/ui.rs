//! Terminal output: spinner while a run is in progress, colored job table.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use jobrelay::orchestrator::RunSummary;
use jobrelay::state_machine::{Job, JobStatus};
use jobrelay::submission::ChapterRequest;

/// Spinner shown while the pipeline works.
pub struct RunProgress {
    pb: ProgressBar,
    green: Style,
    yellow: Style,
}

impl RunProgress {
    pub fn start(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            yellow: Style::new().yellow(),
        }
    }

    pub fn finish(&self, summary: Option<RunSummary>) {
        self.pb.finish_and_clear();
        match summary {
            Some(s) => println!(
                "  {} attempted {}, registered {}, polled {}, completed {}, failed {}",
                self.green.apply_to("✓"),
                s.attempted,
                s.registered,
                s.polled,
                s.completed,
                s.failed
            ),
            None => println!(
                "  {} another run is already in progress",
                self.yellow.apply_to("↻")
            ),
        }
    }

    pub fn finish_job(&self, job: &Job) {
        self.pb.finish_and_clear();
        print_job(job);
    }

    pub fn finish_chapters(&self, request: &ChapterRequest) {
        self.pb.finish_and_clear();
        match request {
            ChapterRequest::Skipped => println!(
                "  {} chapters already requested recently, skipped",
                self.yellow.apply_to("↻")
            ),
            ChapterRequest::Existing(job) | ChapterRequest::Submitted(job) => print_job(job),
        }
    }
}

fn status_style(status: JobStatus) -> Style {
    match status {
        JobStatus::Success => Style::new().green().bold(),
        JobStatus::Error => Style::new().red().bold(),
        JobStatus::Processing => Style::new().cyan(),
        JobStatus::Queued | JobStatus::Uploaded => Style::new().yellow(),
    }
}

pub fn print_job(job: &Job) {
    let style = status_style(job.status);
    println!(
        "{}  {:<10}  {:<12}  {}",
        job.id,
        style.apply_to(job.status),
        job.target_type,
        job.identity()
    );
    if let Some(reference) = &job.reference_id {
        println!("    reference: {reference}");
    }
    if let Some(message) = &job.error_message {
        println!("    {}", Style::new().red().apply_to(message));
    }
}

pub fn print_jobs(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("No jobs tracked.");
        return;
    }
    for job in jobs {
        print_job(job);
    }
}

use crate::ai::ReportFetcher;
use crate::config::Config;
use crate::export::{EXPORT_FAILURE_MESSAGE, RasterOptions, Rasterizer, render_report_image};
use crate::loading::STATUS_INTERVAL;
use crate::report::Report;
use crate::report::render::{render_blocks, source_text, terminal_text};
use crate::topic::Topic;
use crate::workflow::Workflow;
use anyhow::{Context, Result, bail};
use chrono::Local;
use dialoguer::{Confirm, MultiSelect, Select, theme::ColorfulTheme};
use std::io::Write;
use tokio::time::{MissedTickBehavior, interval};
use tracing::warn;

pub struct Session<'a> {
    config: &'a Config,
    fetcher: ReportFetcher,
    rasterizer: &'a dyn Rasterizer,
    workflow: Workflow,
}

impl<'a> Session<'a> {
    pub fn new(config: &'a Config, fetcher: ReportFetcher, rasterizer: &'a dyn Rasterizer) -> Self {
        Self {
            config,
            fetcher,
            rasterizer,
            workflow: Workflow::new(),
        }
    }

    /// Select, generate, read, export, start over. Runs until the user quits.
    pub async fn run_interactive(mut self) -> Result<()> {
        let theme = ColorfulTheme::default();

        println!("──────────────────────────────────────────");
        println!("  朝闻 · 今日微博热点");
        println!("  实时聚合微博热搜与热门话题，为您生成一份包含深度观点的早报。");
        println!("──────────────────────────────────────────");

        loop {
            if let Some(error) = self.workflow.error() {
                println!("\n  ! {error}");
            }

            if !self.select_topics(&theme)? {
                return Ok(());
            }

            self.generate_with_status().await;

            let Some(report) = self.workflow.report().cloned() else {
                continue;
            };
            println!("\n{}", terminal_text(&report));

            loop {
                let action = Select::with_theme(&theme)
                    .with_prompt("下一步")
                    .default(0)
                    .items(&["保存早报卡片", "以此为鉴，重新探索", "退出"])
                    .interact()
                    .context("Failed to read next action")?;

                match action {
                    0 => self.export_with_notice(&report).await,
                    1 => {
                        self.workflow.reset();
                        break;
                    }
                    _ => return Ok(()),
                }
            }
        }
    }

    /// Single non-interactive generation for the given topics.
    pub async fn run_once(mut self, topics: &[Topic], export: bool, raw: bool) -> Result<()> {
        for topic in topics {
            if !self.workflow.selection().contains(*topic) {
                self.workflow.toggle(*topic);
            }
        }

        if !self.workflow.can_generate() {
            bail!("Select at least one topic. Run `zhaowen topics` to list them.");
        }

        self.generate_with_status().await;

        if let Some(error) = self.workflow.error() {
            bail!("{error}");
        }

        let report = self
            .workflow
            .report()
            .cloned()
            .context("Report generation finished without a report")?;

        if raw {
            println!("{}", source_text(&render_blocks(&report.content)));
        } else {
            println!("{}", terminal_text(&report));
        }

        if export {
            self.export_with_notice(&report).await;
        }

        Ok(())
    }

    fn select_topics(&mut self, theme: &ColorfulTheme) -> Result<bool> {
        loop {
            let labels = Topic::ALL.map(|topic| format!("{} ({})", topic.label(), topic.slug()));
            let defaults = Topic::ALL.map(|topic| self.workflow.selection().contains(topic));

            let chosen = MultiSelect::with_theme(theme)
                .with_prompt("定制您的热搜分类 (空格选择，回车确认)")
                .items(&labels)
                .defaults(&defaults)
                .interact()
                .context("Failed to read topic selection")?;

            for (index, topic) in Topic::ALL.into_iter().enumerate() {
                if chosen.contains(&index) != self.workflow.selection().contains(topic) {
                    self.workflow.toggle(topic);
                }
            }

            if self.workflow.can_generate() {
                return Ok(true);
            }

            let retry = Confirm::with_theme(theme)
                .with_prompt("尚未选择任何主题。重新选择？")
                .default(true)
                .interact()
                .context("Failed to read confirmation")?;

            if !retry {
                return Ok(false);
            }
        }
    }

    async fn generate_with_status(&mut self) {
        let Some(pending) = self.workflow.begin(Local::now().date_naive()) else {
            return;
        };

        let fetch = self.fetcher.fetch(&pending.request);
        tokio::pin!(fetch);

        let mut ticker = interval(STATUS_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let labels = pending
            .topics
            .iter()
            .map(|topic| topic.label())
            .collect::<Vec<_>>()
            .join("、");
        println!("\n  正在策划早报: {labels}");
        let outcome = loop {
            tokio::select! {
                outcome = &mut fetch => break outcome,
                _ = ticker.tick() => {
                    if let Some(message) = self.workflow.status_message() {
                        eprint!("\r\x1b[2K  {message}");
                        let _ = std::io::stderr().flush();
                    }
                }
            }
        };
        eprint!("\r\x1b[2K");

        self.workflow.complete(pending.ticket, outcome);
    }

    async fn export_with_notice(&self, report: &Report) {
        let options = RasterOptions::from_config(self.config);
        let saved = render_report_image(self.rasterizer, report, &options)
            .await
            .and_then(|image| image.save_to(&self.config.export_dir));

        match saved {
            Ok(path) => println!("  ✓ 早报卡片已保存: {}", path.display()),
            Err(error) => {
                warn!(error = %format!("{error:#}"), "report export failed");
                eprintln!("  ! {EXPORT_FAILURE_MESSAGE}");
            }
        }
    }
}

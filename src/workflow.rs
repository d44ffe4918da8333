use crate::ai::prompt::{ReportRequest, build_report_request};
use crate::loading::status_message_at;
use crate::report::Report;
use crate::topic::{Selection, Topic};
use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const FETCH_FAILURE_MESSAGE: &str = "生成报告失败。请检查网络连接后重试。";

/// Identifies one generation attempt. A response is applied only while its
/// ticket is still the one the workflow is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ticket(u64);

#[derive(Debug, Clone)]
pub enum WorkflowState {
    Config { error: Option<String> },
    Processing { ticket: Ticket, started_at: Instant },
    Result { report: Arc<Report> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
    Config,
    Processing,
    Result,
}

#[derive(Debug, Clone)]
pub struct PendingGeneration {
    pub ticket: Ticket,
    pub topics: Vec<Topic>,
    pub request: ReportRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    Stale,
}

#[derive(Debug)]
pub struct Workflow {
    selection: Selection,
    state: WorkflowState,
    last_ticket: u64,
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

impl Workflow {
    pub fn new() -> Self {
        Self {
            selection: Selection::new(),
            state: WorkflowState::Config { error: None },
            last_ticket: 0,
        }
    }

    pub fn step(&self) -> Step {
        match self.state {
            WorkflowState::Config { .. } => Step::Config,
            WorkflowState::Processing { .. } => Step::Processing,
            WorkflowState::Result { .. } => Step::Result,
        }
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn report(&self) -> Option<&Arc<Report>> {
        match &self.state {
            WorkflowState::Result { report } => Some(report),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            WorkflowState::Config { error } => error.as_deref(),
            _ => None,
        }
    }

    pub fn status_message(&self) -> Option<&'static str> {
        match &self.state {
            WorkflowState::Processing { started_at, .. } => {
                Some(status_message_at(started_at.elapsed()))
            }
            _ => None,
        }
    }

    pub fn can_generate(&self) -> bool {
        matches!(self.state, WorkflowState::Config { .. }) && !self.selection.is_empty()
    }

    /// Toggles a topic while selecting. Returns `false` when the toggle was
    /// ignored because the workflow is not in the config step.
    pub fn toggle(&mut self, topic: Topic) -> bool {
        if !matches!(self.state, WorkflowState::Config { .. }) {
            debug!(topic = topic.slug(), "topic toggle ignored outside config step");
            return false;
        }

        let selected = self.selection.toggle(topic);
        debug!(topic = topic.slug(), selected, "topic toggled");
        true
    }

    /// Moves to `Processing` and hands back the request to send. Returns `None`
    /// (and changes nothing) unless the workflow is in `Config` with at least
    /// one topic selected.
    pub fn begin(&mut self, date: NaiveDate) -> Option<PendingGeneration> {
        if !self.can_generate() {
            return None;
        }

        let topics = self.selection.topics().to_vec();
        let request = build_report_request(&topics, date)?;

        self.last_ticket += 1;
        let ticket = Ticket(self.last_ticket);
        self.state = WorkflowState::Processing {
            ticket,
            started_at: Instant::now(),
        };

        info!(
            ticket = ticket.0,
            topics = ?topics.iter().map(|topic| topic.slug()).collect::<Vec<_>>(),
            "report generation started"
        );

        Some(PendingGeneration {
            ticket,
            topics,
            request,
        })
    }

    pub fn complete(&mut self, ticket: Ticket, outcome: Result<Report>) -> Completion {
        let current = match self.state {
            WorkflowState::Processing { ticket: current, .. } => Some(current),
            _ => None,
        };

        if current != Some(ticket) {
            debug!(ticket = ticket.0, "discarding stale report response");
            return Completion::Stale;
        }

        self.state = match outcome {
            Ok(report) => {
                info!(ticket = ticket.0, sources = report.sources.len(), "report ready");
                WorkflowState::Result {
                    report: Arc::new(report),
                }
            }
            Err(error) => {
                warn!(ticket = ticket.0, error = %error, "report generation failed");
                WorkflowState::Config {
                    error: Some(FETCH_FAILURE_MESSAGE.to_string()),
                }
            }
        };

        Completion::Applied
    }

    /// Back to `Config`, dropping any report, error or in-flight generation.
    /// The selection is kept so the same topics can be generated again.
    pub fn reset(&mut self) {
        if let WorkflowState::Processing { ticket, .. } = self.state {
            info!(ticket = ticket.0, "in-flight generation abandoned");
        }
        self.state = WorkflowState::Config { error: None };
    }
}

#[cfg(test)]
mod tests {
    use super::{Completion, FETCH_FAILURE_MESSAGE, Step, Workflow};
    use crate::ai::ReportFetcher;
    use crate::ai::tests::{FakeBackend, citation};
    use crate::report::Report;
    use crate::report::render::{Block, render_blocks};
    use crate::topic::Topic;
    use anyhow::anyhow;
    use chrono::{NaiveDate, Utc};
    use std::fmt::Write as _;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).expect("valid date")
    }

    fn two_section_content() -> String {
        let mut content = String::from("今日微博舆论场聚焦科技与体育。\n");
        for section in ["科技与AI", "体育"] {
            let _ = writeln!(content, "\n## {section}");
            for item in 1..=7 {
                let _ = writeln!(content, "### #{section}话题{item}#");
                let _ = writeln!(content, "事件简述。");
                let _ = writeln!(content, "- 网友：评论{item}");
            }
        }
        content
    }

    fn report(content: &str) -> Report {
        Report::new(content.to_string(), Vec::new(), Utc::now())
    }

    async fn generate(workflow: &mut Workflow, fetcher: &ReportFetcher) -> bool {
        let Some(pending) = workflow.begin(date()) else {
            return false;
        };

        let outcome = fetcher.fetch(&pending.request).await;
        workflow.complete(pending.ticket, outcome) == Completion::Applied
    }

    #[tokio::test]
    async fn generate_with_empty_selection_is_a_no_op() {
        let backend = Arc::new(FakeBackend::answering("## 体育", Vec::new()));
        let fetcher = ReportFetcher::new(backend.clone());
        let mut workflow = Workflow::new();

        assert!(!generate(&mut workflow, &fetcher).await);
        assert_eq!(workflow.step(), Step::Config);
        assert!(workflow.error().is_none());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn end_to_end_generation_reaches_result_with_rendered_sections() {
        let backend = Arc::new(FakeBackend::answering(
            &two_section_content(),
            vec![citation(Some("微博热搜"), Some("https://s.weibo.com/top"))],
        ));
        let fetcher = ReportFetcher::new(backend);
        let mut workflow = Workflow::new();

        for raw in ["Technology & AI", "Sports"] {
            assert!(workflow.toggle(raw.parse::<Topic>().expect("topic")));
        }
        assert!(generate(&mut workflow, &fetcher).await);

        assert_eq!(workflow.step(), Step::Result);
        let report = workflow.report().expect("report stored");
        let blocks = render_blocks(&report.content);
        let sections = blocks
            .iter()
            .filter(|block| matches!(block, Block::SectionHeading { .. }))
            .count();
        let items = blocks
            .iter()
            .filter(|block| matches!(block, Block::ItemHeading { .. }))
            .count();
        assert_eq!(sections, 2);
        assert_eq!(items, 14);
        assert_eq!(report.sources.len(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_returns_to_config_with_message() {
        let fetcher = ReportFetcher::new(Arc::new(FakeBackend::failing()));
        let mut workflow = Workflow::new();
        workflow.toggle(Topic::Finance);

        assert!(generate(&mut workflow, &fetcher).await);

        assert_eq!(workflow.step(), Step::Config);
        assert_eq!(workflow.error(), Some(FETCH_FAILURE_MESSAGE));
        assert!(workflow.report().is_none());
        assert!(workflow.selection().contains(Topic::Finance));
    }

    #[tokio::test]
    async fn reset_clears_report_but_keeps_selection() {
        let fetcher = ReportFetcher::new(Arc::new(FakeBackend::answering("## 体育", Vec::new())));
        let mut workflow = Workflow::new();
        workflow.toggle(Topic::Sports);
        workflow.toggle(Topic::Crypto);
        let before = workflow.selection().clone();

        generate(&mut workflow, &fetcher).await;
        assert_eq!(workflow.step(), Step::Result);

        workflow.reset();

        assert_eq!(workflow.step(), Step::Config);
        assert!(workflow.error().is_none());
        assert!(workflow.report().is_none());
        assert_eq!(workflow.selection(), &before);
        assert!(workflow.can_generate());
    }

    #[test]
    fn new_generation_clears_previous_error() {
        let mut workflow = Workflow::new();
        workflow.toggle(Topic::Health);

        let pending = workflow.begin(date()).expect("pending");
        workflow.complete(pending.ticket, Err(anyhow!("offline")));
        assert!(workflow.error().is_some());

        workflow.begin(date()).expect("second attempt");
        assert_eq!(workflow.step(), Step::Processing);
        assert!(workflow.error().is_none());
        assert!(workflow.status_message().is_some());
    }

    #[test]
    fn processing_ignores_toggles_and_second_generate() {
        let mut workflow = Workflow::new();
        workflow.toggle(Topic::Science);
        let pending = workflow.begin(date()).expect("pending");

        assert!(!workflow.toggle(Topic::Sports));
        assert!(workflow.begin(date()).is_none());
        assert_eq!(pending.topics, vec![Topic::Science]);
        assert!(!workflow.selection().contains(Topic::Sports));
    }

    #[test]
    fn late_response_after_reset_is_discarded() {
        let mut workflow = Workflow::new();
        workflow.toggle(Topic::Entertainment);
        let abandoned = workflow.begin(date()).expect("first attempt");

        workflow.reset();
        assert_eq!(
            workflow.complete(abandoned.ticket, Ok(report("## 娱乐"))),
            Completion::Stale
        );
        assert_eq!(workflow.step(), Step::Config);

        let current = workflow.begin(date()).expect("second attempt");
        assert_ne!(current.ticket, abandoned.ticket);
        assert_eq!(
            workflow.complete(abandoned.ticket, Err(anyhow!("late failure"))),
            Completion::Stale
        );
        assert_eq!(workflow.step(), Step::Processing);
        assert!(workflow.error().is_none());

        assert_eq!(
            workflow.complete(current.ticket, Ok(report("## 娱乐"))),
            Completion::Applied
        );
        assert_eq!(workflow.step(), Step::Result);
    }
}

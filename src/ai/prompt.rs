use crate::report::chinese_long_date;
use crate::topic::Topic;
use chrono::NaiveDate;
use serde::Serialize;

pub const ITEMS_PER_TOPIC: usize = 7;
pub const SOURCE_PLATFORM: &str = "微博";
pub const OUTPUT_LANGUAGE: &str = "中文";

pub const SYSTEM_INSTRUCTION: &str = "你是一份专注于微博热点的 AI 编辑。你的任务是聚合今日微博热搜，确保信息的时效性（仅限今日）和来源的准确性（仅限微博）。排版要优雅，内容要包含网友辣评。";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRequest {
    pub prompt: String,
    pub system_instruction: String,
    pub search_grounding: bool,
}

/// Builds the morning-report instruction for `topics` as of `date`. Returns
/// `None` for an empty topic list.
pub fn build_report_request(topics: &[Topic], date: NaiveDate) -> Option<ReportRequest> {
    if topics.is_empty() {
        return None;
    }

    let date_text = chinese_long_date(date);
    let topic_list = topics
        .iter()
        .map(|topic| topic.label())
        .collect::<Vec<_>>()
        .join(", ");

    let prompt = format!(
        r#"你是一位“朝闻”（Zhaowen）栏目的资深主编。
**今天是 {date_text}。**

**核心任务：**
请**仅**从**中国{SOURCE_PLATFORM}（Weibo）**平台获取**今日**的实时热点和热搜榜单，为读者制作一份深度的{SOURCE_PLATFORM}早报。
**严禁**使用旧闻，必须是今天发生或今天正在热议的内容。

主题：{topic_list}。

**严格搜索指令：**
1. 仅搜索{SOURCE_PLATFORM}平台（site:weibo.com 或 关键词“微博热搜”）。
2. 确保内容的时间戳是**今天**。
3. 寻找具有高讨论度（热搜前50）、高转发量的话题。

**内容生成要求：**
1. **开篇**：写一段优美的卷首语，概述今日{SOURCE_PLATFORM}舆论场的焦点（约50字）。
2. **分栏**：为每个选定的主题创建一个带有艺术感的标题（## 主题）。
3. **条目数量**：在每个主题下，**必须列出 {ITEMS_PER_TOPIC} 条**最热门的新闻/话题。
4. **条目格式**：
   - 标题：使用 ### 并带上标准的微博话题格式（如 #话题#）。
   - 内容：简述事件事实，并**必须摘录1-2条网友的典型热评或观点**（体现微博特色）。
5. **图片元素**：尝试寻找并插入相关的图片链接（Markdown格式 `![描述](url)`），特别是寻找新闻配图或热搜封面图。

**严格规则：**
- 输出语言：{OUTPUT_LANGUAGE}。
- 来源限制：**必须来自{SOURCE_PLATFORM}**。
- 时间限制：**必须是今天**。
- 风格：高级早报，排版整洁，强调舆论观点。
"#
    );

    Some(ReportRequest {
        prompt,
        system_instruction: SYSTEM_INSTRUCTION.to_string(),
        search_grounding: true,
    })
}

#[cfg(test)]
mod tests {
    use super::{ITEMS_PER_TOPIC, build_report_request};
    use crate::topic::Topic;
    use chrono::NaiveDate;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).expect("valid date")
    }

    #[test]
    fn empty_topics_build_nothing() {
        assert!(build_report_request(&[], date()).is_none());
    }

    #[test]
    fn prompt_encodes_constraints() {
        let request = build_report_request(&[Topic::Technology, Topic::Sports], date())
            .expect("request for non-empty topics");

        assert!(request.prompt.contains("今天是 2026年10月17日星期六"));
        assert!(request.prompt.contains("主题：科技与AI, 体育。"));
        assert!(request.prompt.contains(&format!("必须列出 {ITEMS_PER_TOPIC} 条")));
        assert!(request.prompt.contains("**严禁**使用旧闻"));
        assert!(request.prompt.contains("site:weibo.com"));
        assert!(request.prompt.contains("输出语言：中文"));
        assert!(request.prompt.contains("（## 主题）"));
        assert!(request.prompt.contains("使用 ###"));
        assert!(request.prompt.contains("![描述](url)"));
        assert!(request.search_grounding);
        assert!(request.system_instruction.contains("仅限微博"));
    }

    #[test]
    fn topic_order_follows_selection_order() {
        let request =
            build_report_request(&[Topic::Sports, Topic::Technology], date()).expect("request");
        assert!(request.prompt.contains("主题：体育, 科技与AI。"));
    }
}

//! Per-message moderation: resolve chat state, detect, score, act.

use std::{collections::HashSet, sync::Arc, time::Duration};

use chrono::Utc;

use crate::{
    chat_state::{ChatState, ChatStateCache},
    coalesce::Coalescer,
    config::Config,
    deletion::DeletionQueue,
    detector::{ScriptDiff, ScriptDiffDetector},
    domain::ChatId,
    formatting::{escape_html, user_link},
    logging::Logger,
    messaging::{port::PlatformPort, types::GroupMessage},
    Error,
};

pub const TOO_MANY_MARKER: &str = "too many";

#[derive(Clone, Debug)]
pub struct ModerationConfig {
    pub admin_refresh_interval: Duration,
    /// Violation when the NG rate reaches this percentage.
    pub ng_rate_threshold: u32,
    /// Longest differing-character list spelled out in a reason.
    pub reason_max_chars: usize,
    pub default_allow_words: HashSet<String>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            admin_refresh_interval: Duration::from_secs(600),
            ng_rate_threshold: 20,
            reason_max_chars: 15,
            default_allow_words: HashSet::new(),
        }
    }
}

impl From<&Config> for ModerationConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            admin_refresh_interval: cfg.admin_refresh_interval,
            ng_rate_threshold: cfg.ng_rate_threshold,
            reason_max_chars: cfg.reason_max_chars,
            default_allow_words: cfg.default_allow_words.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViolationField {
    Content,
    Name,
}

impl ViolationField {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationField::Content => "content",
            ViolationField::Name => "name",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub field: ViolationField,
    pub ng_rate: u32,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Clean,
    /// The offending message could not be deleted; nothing else was done.
    DeleteFailed(Violation),
    /// Deleted, but the notification could not be sent.
    Deleted(Violation),
    /// Deleted and notified; the notification is queued for removal.
    Notified(Violation),
}

type RefreshResult = std::result::Result<ChatState, Arc<Error>>;

pub struct ModerationPipeline {
    cfg: ModerationConfig,
    cache: Arc<ChatStateCache>,
    detector: Arc<ScriptDiffDetector>,
    platform: Arc<dyn PlatformPort>,
    deletions: DeletionQueue,
    logger: Arc<dyn Logger>,
    refreshes: Coalescer<ChatId, RefreshResult>,
}

impl ModerationPipeline {
    pub fn new(
        cfg: ModerationConfig,
        cache: Arc<ChatStateCache>,
        detector: Arc<ScriptDiffDetector>,
        platform: Arc<dyn PlatformPort>,
        deletions: DeletionQueue,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            cfg,
            cache,
            detector,
            platform,
            deletions,
            logger,
            refreshes: Coalescer::new(),
        }
    }

    pub fn cache(&self) -> &Arc<ChatStateCache> {
        &self.cache
    }

    pub async fn handle_message(&self, msg: &GroupMessage) -> Outcome {
        let state = self.resolve_chat_state(msg.chat_id).await;

        let Some(violation) = self.check(msg, &state) else {
            return Outcome::Clean;
        };

        if let Err(e) = self.platform.delete_message(msg.message_ref()).await {
            self.logger.error(
                "pipeline",
                &format!(
                    "delete message {} in chat {} failed: {e}",
                    msg.message_id.0, msg.chat_id.0
                ),
            );
            return Outcome::DeleteFailed(violation);
        }

        let html = format!(
            "Deleted message from {}. Reason: [{}]",
            user_link(&msg.sender),
            escape_html(&violation.reason)
        );
        let notice = match self.platform.send_html(msg.chat_id, &html).await {
            Ok(notice) => notice,
            Err(e) => {
                self.logger
                    .error("pipeline", &format!("send notification failed: {e}"));
                return Outcome::Deleted(violation);
            }
        };
        self.deletions.push(notice);

        self.logger.info(
            "pipeline",
            &format!(
                "deleted a message from {} in chat {} ({} rate {}%). Reason: [{}]",
                msg.sender.name,
                msg.chat_id.0,
                violation.field.as_str(),
                violation.ng_rate,
                violation.reason
            ),
        );
        Outcome::Notified(violation)
    }

    /// Current state for the chat, refreshing administrators first if the
    /// snapshot is too old. Concurrent callers for one chat share a single
    /// refresh. On refresh failure the cached state is used.
    pub async fn resolve_chat_state(&self, chat_id: ChatId) -> ChatState {
        let (res, joined) = self
            .refreshes
            .run(chat_id, || async move {
                let saved = self.cache.get(chat_id).await;
                if !saved.is_stale(Utc::now(), self.max_age()) {
                    return Ok(saved);
                }
                match self.refresh_administrators(chat_id).await {
                    Ok(()) => Ok(self.cache.get(chat_id).await),
                    Err(e) => Err(Arc::new(e)),
                }
            })
            .await;

        if joined {
            self.logger
                .debug("pipeline", &format!("joined in-flight refresh for chat {}", chat_id.0));
        }

        match res {
            Ok(state) => state,
            Err(e) => {
                self.logger.error(
                    "pipeline",
                    &format!("refresh chat {} failed: {e}", chat_id.0),
                );
                self.cache.get(chat_id).await
            }
        }
    }

    /// Fetch the administrator list, store it and persist the table.
    ///
    /// The platform call happens outside the chat's lock.
    pub async fn refresh_administrators(&self, chat_id: ChatId) -> crate::Result<()> {
        let admins = self.platform.fetch_admins(chat_id).await?;
        let count = admins.len();
        self.cache
            .mutate(chat_id, |st| {
                st.record_refresh(admins, Utc::now());
                Ok(())
            })
            .await?;
        self.cache.save().await?;
        self.logger.debug(
            "pipeline",
            &format!("refreshed {count} administrators for chat {}", chat_id.0),
        );
        Ok(())
    }

    /// Content first; the sender's name only if the content is clean.
    pub fn check(&self, msg: &GroupMessage, state: &ChatState) -> Option<Violation> {
        let content = self.detector.evaluate(&msg.text);
        if let Some(v) = self.score(ViolationField::Content, &content, state) {
            return Some(v);
        }

        let name = self.detector.evaluate(&msg.sender.name);
        self.score(ViolationField::Name, &name, state)
    }

    fn score(&self, field: ViolationField, diff: &ScriptDiff, state: &ChatState) -> Option<Violation> {
        let point = self.ng_point(&diff.differing, state);
        let rate = ng_rate(point, diff.total)?;
        if rate < self.cfg.ng_rate_threshold {
            return None;
        }
        Some(Violation {
            field,
            ng_rate: rate,
            reason: reason(&diff.differing, self.cfg.reason_max_chars),
        })
    }

    /// Differing characters minus those allowed globally or by the chat.
    pub fn ng_point(&self, differing: &[char], state: &ChatState) -> usize {
        let mut buf = [0u8; 4];
        differing
            .iter()
            .filter(|c| {
                let s: &str = c.encode_utf8(&mut buf);
                !self.cfg.default_allow_words.contains(s) && !state.allow_words.contains(s)
            })
            .count()
    }

    fn max_age(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.cfg.admin_refresh_interval)
            .unwrap_or_else(|_| chrono::Duration::minutes(10))
    }
}

/// `round(100 * point / total)`; `None` when there is nothing to rate.
pub fn ng_rate(point: usize, total: usize) -> Option<u32> {
    if total == 0 {
        return None;
    }
    let rate = (200 * point + total) / (2 * total);
    Some(u32::try_from(rate).unwrap_or(u32::MAX))
}

fn reason(differing: &[char], max_chars: usize) -> String {
    if differing.len() > max_chars {
        return TOO_MANY_MARKER.to_string();
    }
    differing
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        deletion::DeletionConfig,
        domain::{ChatMember, MessageId, MessageRef},
        store::MemoryStore,
        testing::{FakeConverter, FakePlatform, MemoryLogger},
    };

    // Five Simplified characters and their Traditional forms.
    const PAIRS: &[(char, char)] = &[
        ('这', '這'),
        ('发', '發'),
        ('国', '國'),
        ('说', '說'),
        ('们', '們'),
    ];

    struct Harness {
        pipeline: Arc<ModerationPipeline>,
        platform: Arc<FakePlatform>,
        store: Arc<MemoryStore>,
        deletions: DeletionQueue,
    }

    fn harness(cfg: ModerationConfig) -> Harness {
        let platform = Arc::new(FakePlatform::default());
        let store = Arc::new(MemoryStore::default());
        let logger = Arc::new(MemoryLogger::default());
        let cache = Arc::new(ChatStateCache::new(store.clone()));
        let detector = Arc::new(ScriptDiffDetector::new(
            Arc::new(FakeConverter::with_pairs(PAIRS)),
            logger.clone(),
        ));
        let deletions = DeletionQueue::new(platform.clone(), logger.clone(), DeletionConfig::default());
        let pipeline = Arc::new(ModerationPipeline::new(
            cfg,
            cache,
            detector,
            platform.clone(),
            deletions.clone(),
            logger,
        ));
        Harness {
            pipeline,
            platform,
            store,
            deletions,
        }
    }

    fn group_msg(text: &str, sender: &str) -> GroupMessage {
        GroupMessage {
            chat_id: ChatId(-100),
            message_id: MessageId(42),
            sender: ChatMember::new(7, sender),
            text: text.to_string(),
        }
    }

    #[test]
    fn ng_rate_rounds_and_skips_empty() {
        assert_eq!(ng_rate(5, 20), Some(25));
        assert_eq!(ng_rate(1, 3), Some(33));
        assert_eq!(ng_rate(2, 3), Some(67));
        assert_eq!(ng_rate(1, 8), Some(13)); // 12.5 rounds half up
        assert_eq!(ng_rate(0, 10), Some(0));
        assert_eq!(ng_rate(3, 0), None);
    }

    #[test]
    fn reason_lists_up_to_limit_then_marker() {
        assert_eq!(reason(&['这', '发'], 15), "这,发");
        assert_eq!(reason(&['a'; 15], 15).split(',').count(), 15);
        assert_eq!(reason(&['a'; 16], 15), TOO_MANY_MARKER);
    }

    #[tokio::test]
    async fn allow_words_discount_ng_point() {
        let mut cfg = ModerationConfig::default();
        cfg.default_allow_words.insert("这".to_string());
        let h = harness(cfg);

        let mut state = ChatState::default();
        state.add_allow_word("发");
        let point = h.pipeline.ng_point(&['这', '发', '国', '国'], &state);
        assert_eq!(point, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn twenty_chars_five_differ_is_deleted_notified_and_cleaned_up() {
        let h = harness(ModerationConfig::default());
        h.deletions.start().await;

        // 15 Traditional/neutral characters + 5 Simplified ones.
        let text = "今天天氣很好我們一起去公園散步这发国说们";
        let msg = group_msg(text, "Alice");
        assert_eq!(h.pipeline.detector.evaluate(text).total, 20);

        let outcome = h.pipeline.handle_message(&msg).await;
        let Outcome::Notified(v) = outcome else {
            panic!("expected notified, got {outcome:?}");
        };
        assert_eq!(v.field, ViolationField::Content);
        assert_eq!(v.ng_rate, 25);
        assert_eq!(v.reason, "这,发,国,说,们");

        assert_eq!(h.platform.deleted(), vec![msg.message_ref()]);
        let sent = h.platform.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("tg://user?id=7"));
        assert!(sent[0].1.contains("Reason: [这,发,国,说,们]"));

        let notice = MessageRef {
            chat_id: ChatId(-100),
            message_id: MessageId(1000),
        };
        assert!(h.deletions.is_pending(notice));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(h.deletions.is_pending(notice));
        assert_eq!(h.platform.deleted().len(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!h.deletions.is_pending(notice));
        assert_eq!(h.platform.deleted(), vec![msg.message_ref(), notice]);

        h.deletions.stop().await;
    }

    #[tokio::test]
    async fn more_than_fifteen_differences_use_marker() {
        let h = harness(ModerationConfig::default());
        let text: String = "这发国说们".repeat(4);
        let outcome = h.pipeline.handle_message(&group_msg(&text, "Bob")).await;
        let Outcome::Notified(v) = outcome else {
            panic!("expected notified, got {outcome:?}");
        };
        assert_eq!(v.ng_rate, 100);
        assert_eq!(v.reason, TOO_MANY_MARKER);
        assert!(h.platform.sent()[0].1.contains("Reason: [too many]"));
    }

    #[tokio::test]
    async fn below_threshold_and_non_han_are_clean() {
        let h = harness(ModerationConfig::default());
        // 1 of 6 differ: 17%.
        let outcome = h
            .pipeline
            .handle_message(&group_msg("今天天氣很发", "Carol"))
            .await;
        assert_eq!(outcome, Outcome::Clean);

        let outcome = h
            .pipeline
            .handle_message(&group_msg("hello there", "Carol"))
            .await;
        assert_eq!(outcome, Outcome::Clean);
        assert!(h.platform.deleted().is_empty());
    }

    #[tokio::test]
    async fn name_violation_is_judged_on_the_name_rate() {
        let h = harness(ModerationConfig::default());
        let outcome = h
            .pipeline
            .handle_message(&group_msg("just english content", "这发国"))
            .await;
        let Outcome::Notified(v) = outcome else {
            panic!("expected notified, got {outcome:?}");
        };
        assert_eq!(v.field, ViolationField::Name);
        assert_eq!(v.ng_rate, 100);
        assert_eq!(v.reason, "这,发,国");

        // A clean name on clean content is not flagged.
        let outcome = h
            .pipeline
            .handle_message(&group_msg("just english content", "這個"))
            .await;
        assert_eq!(outcome, Outcome::Clean);
    }

    #[tokio::test]
    async fn failed_delete_sends_nothing() {
        let h = harness(ModerationConfig::default());
        h.platform
            .script_delete_errors(vec![Error::Platform("not enough rights".to_string())]);
        let outcome = h.pipeline.handle_message(&group_msg("这发国", "Dan")).await;
        assert!(matches!(outcome, Outcome::DeleteFailed(_)));
        assert!(h.platform.sent().is_empty());
        assert_eq!(h.deletions.pending_len(), 0);
    }

    #[tokio::test]
    async fn failed_notification_is_not_queued() {
        let h = harness(ModerationConfig::default());
        h.platform.fail_send(true);
        let outcome = h.pipeline.handle_message(&group_msg("这发国", "Eve")).await;
        assert!(matches!(outcome, Outcome::Deleted(_)));
        assert_eq!(h.platform.deleted().len(), 1);
        assert_eq!(h.deletions.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_refreshes_share_one_fetch() {
        let h = harness(ModerationConfig::default());
        h.platform
            .set_admins(ChatId(-100), vec![ChatMember::new(1, "Owner")]);
        h.platform.set_fetch_delay(Duration::from_millis(200));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let p = h.pipeline.clone();
            handles.push(tokio::spawn(async move {
                p.resolve_chat_state(ChatId(-100)).await
            }));
        }
        let mut states = Vec::new();
        for handle in handles {
            states.push(handle.await.unwrap());
        }

        assert_eq!(h.platform.fetch_calls(), 1);
        let first = &states[0];
        assert_eq!(first.administrators, vec![ChatMember::new(1, "Owner")]);
        assert!(states.iter().all(|s| s == first));

        // Persisted right after the refresh.
        assert_eq!(h.store.save_count(), 1);
        let table = h.store.snapshot().unwrap();
        assert_eq!(table[&-100].administrators.len(), 1);

        // Fresh now: no second fetch.
        h.pipeline.resolve_chat_state(ChatId(-100)).await;
        assert_eq!(h.platform.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn refresh_failure_falls_back_to_cached_state() {
        let h = harness(ModerationConfig::default());
        h.pipeline
            .cache()
            .mutate(ChatId(-100), |s| {
                s.add_allow_word("这");
                Ok(())
            })
            .await
            .unwrap();
        h.platform.fail_fetch(true);

        let state = h.pipeline.resolve_chat_state(ChatId(-100)).await;
        assert!(state.allow_words.contains("这"));
        assert_eq!(h.store.save_count(), 0);

        // Still stale, so the next message tries again.
        h.pipeline.resolve_chat_state(ChatId(-100)).await;
        assert_eq!(h.platform.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn chat_allow_words_suppress_violation() {
        let h = harness(ModerationConfig::default());
        h.pipeline
            .cache()
            .mutate(ChatId(-100), |s| {
                for w in ["这", "发", "国"] {
                    s.add_allow_word(w);
                }
                Ok(())
            })
            .await
            .unwrap();
        let outcome = h.pipeline.handle_message(&group_msg("这发国", "Fay")).await;
        assert_eq!(outcome, Outcome::Clean);
    }
}

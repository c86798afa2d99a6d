//! Session State Machine: routes inbound conversation events to handlers,
//! drives the catalog and the Report Composer, and talks back through the
//! delivery gateway.
//!
//! One dispatch rule holds everywhere: catalog or rendering failures abort
//! the current flow with a generic notice and a reset to the main menu;
//! delivery failures are logged and swallowed. The loop itself never dies.

use std::collections::HashSet;
use std::path::PathBuf;

use tokio::sync::Mutex;

use crate::catalog::Catalog;
use crate::compose::{Sampler, ThreadSampler};
use crate::error::FlowError;
use crate::gateway::{Button, ConversationId, DeliveryGateway, Event, EventKind, MessageId};
use crate::report::generate_disposition;
use crate::session::{MenuState, PendingAction, Session, SessionStore};

const MENU_TEXT: &str = "Select an option:";

/// Where templates come from and artifacts go.
#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub template_path: PathBuf,
    pub output_dir: PathBuf,
}

fn menu_buttons() -> Vec<Button> {
    vec![
        Button::new("Generate Report", "menu_generate"),
        Button::new("View Activities", "menu_view"),
    ]
}

fn parse_payload_id(payload: &str, prefix: &str) -> Option<i64> {
    payload.strip_prefix(prefix)?.parse().ok()
}

pub struct Dispatcher<C: Catalog, G: DeliveryGateway> {
    catalog: C,
    gateway: G,
    sessions: SessionStore,
    settings: ReportSettings,
    sampler: Mutex<Box<dyn Sampler>>,
}

impl<C: Catalog, G: DeliveryGateway> Dispatcher<C, G> {
    pub fn new(catalog: C, gateway: G, settings: ReportSettings) -> Self {
        Self {
            catalog,
            gateway,
            sessions: SessionStore::new(),
            settings,
            sampler: Mutex::new(Box::new(ThreadSampler)),
        }
    }

    /// Swap the randomness source. Tests inject scripted samplers here.
    pub fn with_sampler(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.sampler = Mutex::new(sampler);
        self
    }

    /// Dispatch one inbound event. The conversation's session lock is held
    /// for the whole handler, so events for one conversation serialize while
    /// different conversations interleave freely.
    pub async fn handle_event(&self, event: Event) {
        let conversation = event.conversation;
        let session = self.sessions.session(conversation);
        let mut session = session.lock().await;
        match event.kind {
            EventKind::Command(_) => {
                session.reset();
                self.show_menu(conversation, None).await;
            }
            EventKind::ButtonPress { message, payload } => {
                self.handle_button(conversation, message, &mut session, &payload)
                    .await;
            }
            EventKind::Text(text) => {
                self.handle_text(conversation, &mut session, &text).await;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Button routing
    // -----------------------------------------------------------------------

    async fn handle_button(
        &self,
        conversation: ConversationId,
        message: MessageId,
        session: &mut Session,
        payload: &str,
    ) {
        let result = if payload == "menu_back" {
            session.reset();
            self.show_menu(conversation, Some(message)).await;
            Ok(())
        } else if payload == "menu_generate" {
            self.start_generate(conversation, session).await
        } else if payload == "menu_view" {
            self.start_view(conversation, message, session).await
        } else if let Some(id) = parse_payload_id(payload, "report_") {
            self.run_generate(conversation, message, session, id).await
        } else if let Some(id) = parse_payload_id(payload, "view_") {
            self.show_person(conversation, message, session, id).await
        } else if let Some(id) = parse_payload_id(payload, "add_") {
            self.start_add(conversation, message, session, id).await
        } else if let Some(id) = parse_payload_id(payload, "remove_") {
            self.start_remove(conversation, message, session, id).await
        } else {
            log::debug!("ignoring unknown button payload {payload:?}");
            Ok(())
        };
        if let Err(error) = result {
            self.abort_flow(conversation, session, error).await;
        }
    }

    /// List persons for report generation.
    async fn start_generate(
        &self,
        conversation: ConversationId,
        session: &mut Session,
    ) -> Result<(), FlowError> {
        let persons = self.catalog.list_persons()?;
        if persons.is_empty() {
            self.notify_send(conversation, "No persons in the catalog yet.", &[])
                .await;
            return Ok(());
        }
        let buttons: Vec<Button> = persons
            .iter()
            .map(|p| Button::new(p.full_name.as_str(), format!("report_{}", p.id)))
            .collect();
        self.notify_send(conversation, "Select a user:", &buttons).await;
        session.state = MenuState::AwaitingPersonForGenerate;
        Ok(())
    }

    /// List persons for viewing activities.
    async fn start_view(
        &self,
        conversation: ConversationId,
        message: MessageId,
        session: &mut Session,
    ) -> Result<(), FlowError> {
        let persons = self.catalog.list_persons()?;
        if persons.is_empty() {
            self.notify_send(conversation, "No persons in the catalog yet.", &[])
                .await;
            return Ok(());
        }
        let mut buttons: Vec<Button> = persons
            .iter()
            .map(|p| Button::new(p.full_name.as_str(), format!("view_{}", p.id)))
            .collect();
        buttons.push(Button::new("Back", "menu_back"));
        self.notify_edit(
            conversation,
            message,
            "Select a user to view activities:",
            &buttons,
        )
        .await;
        session.state = MenuState::AwaitingPersonForView;
        Ok(())
    }

    /// Generate and deliver a disposition for the chosen person.
    async fn run_generate(
        &self,
        conversation: ConversationId,
        message: MessageId,
        session: &mut Session,
        person_id: i64,
    ) -> Result<(), FlowError> {
        let person = self
            .catalog
            .find_person(person_id)?
            .ok_or(FlowError::PersonNotFound(person_id))?;
        let entries = self.catalog.list_entries(person_id)?;
        if entries.is_empty() {
            self.notify_edit(
                conversation,
                message,
                &format!("No reports found for {}.", person.full_name),
                &[],
            )
            .await;
            session.reset();
            self.show_menu(conversation, None).await;
            return Ok(());
        }

        let artifact = {
            let mut sampler = self.sampler.lock().await;
            generate_disposition(
                &self.settings.template_path,
                &self.settings.output_dir,
                &person.full_name,
                &entries,
                sampler.as_mut(),
            )?
        };

        if let Err(error) = self
            .gateway
            .send_document(conversation, &artifact.path, &artifact.filename)
            .await
        {
            log::warn!("document delivery to conversation {conversation} failed: {error}");
        }
        if let Err(error) = std::fs::remove_file(&artifact.path) {
            log::warn!(
                "failed to delete artifact {}: {error}",
                artifact.path.display()
            );
        }

        self.notify_edit(
            conversation,
            message,
            &format!("Report generated for {}.", person.full_name),
            &[],
        )
        .await;
        session.reset();
        self.show_menu(conversation, None).await;
        Ok(())
    }

    /// Show a person's activities with Add/Remove/Back options.
    async fn show_person(
        &self,
        conversation: ConversationId,
        message: MessageId,
        session: &mut Session,
        person_id: i64,
    ) -> Result<(), FlowError> {
        let person = self
            .catalog
            .find_person(person_id)?
            .ok_or(FlowError::PersonNotFound(person_id))?;
        let entries = self.catalog.list_entries(person_id)?;

        let text = if entries.is_empty() {
            format!("No reports for {}.", person.full_name)
        } else {
            let mut text = format!("Activities for {}:\n", person.full_name);
            for (idx, entry) in entries.iter().enumerate() {
                text.push_str(&format!("{}. {}\n", idx + 1, entry));
            }
            text
        };
        let buttons = vec![
            Button::new("Add Activity", format!("add_{person_id}")),
            Button::new("Remove Activity", format!("remove_{person_id}")),
            Button::new("Back", "menu_back"),
        ];
        self.notify_edit(conversation, message, &text, &buttons).await;
        session.state = MenuState::ViewingPersonOptions;
        session.person = Some(person_id);
        Ok(())
    }

    /// Prompt for new entries.
    async fn start_add(
        &self,
        conversation: ConversationId,
        message: MessageId,
        session: &mut Session,
        person_id: i64,
    ) -> Result<(), FlowError> {
        session.person = Some(person_id);
        session.state = MenuState::AwaitingFreeText(PendingAction::Add);
        self.notify_edit(
            conversation,
            message,
            "Send the new report(s) to add. Separate multiple reports by new lines.",
            &[],
        )
        .await;
        Ok(())
    }

    /// Prompt for 1-based indices of entries to remove.
    async fn start_remove(
        &self,
        conversation: ConversationId,
        message: MessageId,
        session: &mut Session,
        person_id: i64,
    ) -> Result<(), FlowError> {
        let entries = self.catalog.list_entries(person_id)?;
        if entries.is_empty() {
            self.notify_edit(
                conversation,
                message,
                "No reports to remove for this user.",
                &[],
            )
            .await;
            session.reset();
            self.show_menu(conversation, None).await;
            return Ok(());
        }
        let mut text =
            String::from("Send the numbers of reports to remove, separated by commas:\n");
        for (idx, entry) in entries.iter().enumerate() {
            text.push_str(&format!("{}. {}\n", idx + 1, entry));
        }
        self.notify_edit(conversation, message, &text, &[]).await;
        session.person = Some(person_id);
        session.state = MenuState::AwaitingFreeText(PendingAction::Remove);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Free text
    // -----------------------------------------------------------------------

    async fn handle_text(
        &self,
        conversation: ConversationId,
        session: &mut Session,
        text: &str,
    ) {
        let Some(action) = session.pending_action() else {
            // Free text outside an add/remove cycle: no reply, no state change.
            return;
        };
        let Some(person_id) = session.person else {
            log::warn!(
                "pending action without a selected person; resetting conversation {conversation}"
            );
            session.reset();
            return;
        };
        let result = match action {
            PendingAction::Add => self.finish_add(conversation, person_id, text).await,
            PendingAction::Remove => self.finish_remove(conversation, person_id, text).await,
        };
        match result {
            Ok(()) => {
                session.reset();
                self.show_menu(conversation, None).await;
            }
            Err(error) => self.abort_flow(conversation, session, error).await,
        }
    }

    /// Insert one entry per non-empty line, preserving line order.
    async fn finish_add(
        &self,
        conversation: ConversationId,
        person_id: i64,
        text: &str,
    ) -> Result<(), FlowError> {
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        for line in &lines {
            self.catalog.insert_entry(person_id, line)?;
        }
        self.notify_send(
            conversation,
            &format!("{} report(s) added successfully.", lines.len()),
            &[],
        )
        .await;
        Ok(())
    }

    /// Delete entries by 1-based index against the current entry order.
    /// Non-numeric and out-of-range tokens are dropped without individual
    /// notice; repeated indices are consumed once. Only the aggregate count
    /// is reported.
    async fn finish_remove(
        &self,
        conversation: ConversationId,
        person_id: i64,
        text: &str,
    ) -> Result<(), FlowError> {
        let entries = self.catalog.list_entries(person_id)?;
        let mut consumed: HashSet<usize> = HashSet::new();
        for token in text.split(',') {
            let Ok(index) = token.trim().parse::<usize>() else {
                continue;
            };
            if index < 1 || index > entries.len() {
                continue;
            }
            if !consumed.insert(index) {
                continue;
            }
            self.catalog.delete_entry(person_id, &entries[index - 1])?;
        }
        self.notify_send(
            conversation,
            &format!("{} report(s) removed successfully.", consumed.len()),
            &[],
        )
        .await;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Outbound helpers — best-effort delivery
    // -----------------------------------------------------------------------

    async fn show_menu(&self, conversation: ConversationId, edit: Option<MessageId>) {
        match edit {
            Some(message) => {
                self.notify_edit(conversation, message, MENU_TEXT, &menu_buttons())
                    .await
            }
            None => self.notify_send(conversation, MENU_TEXT, &menu_buttons()).await,
        }
    }

    async fn abort_flow(
        &self,
        conversation: ConversationId,
        session: &mut Session,
        error: FlowError,
    ) {
        log::error!("flow aborted for conversation {conversation}: {error}");
        session.reset();
        self.notify_send(conversation, error.user_notice(), &[]).await;
        self.show_menu(conversation, None).await;
    }

    async fn notify_send(&self, conversation: ConversationId, text: &str, buttons: &[Button]) {
        if let Err(error) = self.gateway.send_text(conversation, text, buttons).await {
            log::warn!("send to conversation {conversation} failed: {error}");
        }
    }

    async fn notify_edit(
        &self,
        conversation: ConversationId,
        message: MessageId,
        text: &str,
        buttons: &[Button],
    ) {
        if let Err(error) = self
            .gateway
            .edit_text(conversation, message, text, buttons)
            .await
        {
            log::warn!("edit in conversation {conversation} failed: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    use async_trait::async_trait;

    use crate::db::{DbError, Person};
    use crate::docx::write_minimal_template;
    use crate::gateway::GatewayError;

    struct MemoryCatalog {
        persons: Vec<Person>,
        entries: StdMutex<HashMap<i64, Vec<String>>>,
    }

    impl MemoryCatalog {
        fn new(persons: &[(i64, &str)], entries: &[(i64, &[&str])]) -> Self {
            Self {
                persons: persons
                    .iter()
                    .map(|(id, name)| Person {
                        id: *id,
                        full_name: name.to_string(),
                    })
                    .collect(),
                entries: StdMutex::new(
                    entries
                        .iter()
                        .map(|(id, texts)| {
                            (*id, texts.iter().map(|t| t.to_string()).collect())
                        })
                        .collect(),
                ),
            }
        }

        fn entries_for(&self, person_id: i64) -> Vec<String> {
            self.entries
                .lock()
                .unwrap()
                .get(&person_id)
                .cloned()
                .unwrap_or_default()
        }
    }

    impl Catalog for MemoryCatalog {
        fn list_persons(&self) -> Result<Vec<Person>, DbError> {
            Ok(self.persons.clone())
        }

        fn find_person(&self, id: i64) -> Result<Option<Person>, DbError> {
            Ok(self.persons.iter().find(|p| p.id == id).cloned())
        }

        fn list_entries(&self, person_id: i64) -> Result<Vec<String>, DbError> {
            Ok(self.entries_for(person_id))
        }

        fn insert_entry(&self, person_id: i64, text: &str) -> Result<(), DbError> {
            self.entries
                .lock()
                .unwrap()
                .entry(person_id)
                .or_default()
                .push(text.to_string());
            Ok(())
        }

        fn delete_entry(&self, person_id: i64, text: &str) -> Result<usize, DbError> {
            let mut map = self.entries.lock().unwrap();
            let list = map.entry(person_id).or_default();
            let before = list.len();
            list.retain(|t| t != text);
            Ok(before - list.len())
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Text {
            text: String,
            buttons: Vec<Button>,
        },
        Edit {
            message: MessageId,
            text: String,
            buttons: Vec<Button>,
        },
        Document {
            filename: String,
            existed_at_delivery: bool,
        },
    }

    #[derive(Default)]
    struct RecordingGateway {
        outbound: StdMutex<Vec<Sent>>,
        next_id: AtomicI64,
        fail_all: AtomicBool,
    }

    impl RecordingGateway {
        fn sent(&self) -> Vec<Sent> {
            self.outbound.lock().unwrap().clone()
        }

        fn texts(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .map(|s| match s {
                    Sent::Text { text, .. } | Sent::Edit { text, .. } => text,
                    Sent::Document { filename, .. } => filename,
                })
                .collect()
        }
    }

    #[async_trait]
    impl DeliveryGateway for RecordingGateway {
        async fn send_text(
            &self,
            _conversation: ConversationId,
            text: &str,
            buttons: &[Button],
        ) -> Result<MessageId, GatewayError> {
            if self.fail_all.load(Ordering::Relaxed) {
                return Err(GatewayError::Send("gateway down".to_string()));
            }
            self.outbound.lock().unwrap().push(Sent::Text {
                text: text.to_string(),
                buttons: buttons.to_vec(),
            });
            Ok(self.next_id.fetch_add(1, Ordering::Relaxed))
        }

        async fn edit_text(
            &self,
            _conversation: ConversationId,
            message: MessageId,
            text: &str,
            buttons: &[Button],
        ) -> Result<(), GatewayError> {
            if self.fail_all.load(Ordering::Relaxed) {
                return Err(GatewayError::Send("gateway down".to_string()));
            }
            self.outbound.lock().unwrap().push(Sent::Edit {
                message,
                text: text.to_string(),
                buttons: buttons.to_vec(),
            });
            Ok(())
        }

        async fn send_document(
            &self,
            _conversation: ConversationId,
            path: &Path,
            filename: &str,
        ) -> Result<(), GatewayError> {
            if self.fail_all.load(Ordering::Relaxed) {
                return Err(GatewayError::Send("gateway down".to_string()));
            }
            self.outbound.lock().unwrap().push(Sent::Document {
                filename: filename.to_string(),
                existed_at_delivery: path.exists(),
            });
            Ok(())
        }
    }

    const CONV: ConversationId = 100;

    fn settings(dir: &Path) -> ReportSettings {
        ReportSettings {
            template_path: dir.join("template.docx"),
            output_dir: dir.join("reports"),
        }
    }

    fn dispatcher(
        catalog: MemoryCatalog,
        dir: &Path,
    ) -> (Dispatcher<MemoryCatalog, Arc<RecordingGateway>>, Arc<RecordingGateway>) {
        let gateway = Arc::new(RecordingGateway::default());
        (
            Dispatcher::new(catalog, gateway.clone(), settings(dir)),
            gateway,
        )
    }

    async fn press(dispatcher: &Dispatcher<MemoryCatalog, Arc<RecordingGateway>>, payload: &str) {
        dispatcher
            .handle_event(Event {
                conversation: CONV,
                kind: EventKind::ButtonPress {
                    message: 1,
                    payload: payload.to_string(),
                },
            })
            .await;
    }

    async fn send_text(dispatcher: &Dispatcher<MemoryCatalog, Arc<RecordingGateway>>, text: &str) {
        dispatcher
            .handle_event(Event {
                conversation: CONV,
                kind: EventKind::Text(text.to_string()),
            })
            .await;
    }

    async fn state_of(dispatcher: &Dispatcher<MemoryCatalog, Arc<RecordingGateway>>) -> Session {
        dispatcher.sessions.session(CONV).lock().await.clone()
    }

    #[tokio::test]
    async fn test_command_shows_menu() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, gateway) =
            dispatcher(MemoryCatalog::new(&[(1, "Alice Reyes")], &[]), dir.path());

        dispatcher
            .handle_event(Event {
                conversation: CONV,
                kind: EventKind::Command("start".to_string()),
            })
            .await;

        let sent = gateway.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Sent::Text { text, buttons } => {
                assert_eq!(text, "Select an option:");
                assert_eq!(buttons.len(), 2);
                assert_eq!(buttons[0].payload, "menu_generate");
                assert_eq!(buttons[1].payload, "menu_view");
            }
            other => panic!("expected menu text, got {other:?}"),
        }
        assert_eq!(state_of(&dispatcher).await.state, MenuState::MenuShown);
    }

    #[tokio::test]
    async fn test_generate_flow_delivers_and_deletes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        write_minimal_template(&dir.path().join("template.docx"), 15, 4).unwrap();
        let catalog = MemoryCatalog::new(
            &[(1, "Alice Reyes")],
            &[(1, &["Studied X", "Reviewed Y", "Wrote Z", "Refactored W", "Tested V"])],
        );
        let (dispatcher, gateway) = dispatcher(catalog, dir.path());

        press(&dispatcher, "menu_generate").await;
        assert_eq!(
            state_of(&dispatcher).await.state,
            MenuState::AwaitingPersonForGenerate
        );
        press(&dispatcher, "report_1").await;

        let sent = gateway.sent();
        let document = sent
            .iter()
            .find_map(|s| match s {
                Sent::Document {
                    filename,
                    existed_at_delivery,
                } => Some((filename.clone(), *existed_at_delivery)),
                _ => None,
            })
            .expect("a document was delivered");
        assert!(document.0.starts_with("DISPOSITION_"));
        assert!(document.0.ends_with("_Alice.docx"));
        assert!(document.1, "artifact must exist at delivery time");

        // Artifact is deleted after delivery.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("reports"))
            .map(|d| d.flatten().collect())
            .unwrap_or_default();
        assert!(leftovers.is_empty(), "artifact left behind: {leftovers:?}");

        assert!(gateway
            .texts()
            .iter()
            .any(|t| t == "Report generated for Alice Reyes."));
        assert_eq!(state_of(&dispatcher).await.state, MenuState::MenuShown);
    }

    #[tokio::test]
    async fn test_generate_with_no_entries_notifies_and_returns_to_menu() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::new(&[(2, "Bob Santos")], &[]);
        let (dispatcher, gateway) = dispatcher(catalog, dir.path());

        press(&dispatcher, "menu_generate").await;
        press(&dispatcher, "report_2").await;

        let texts = gateway.texts();
        assert!(texts.iter().any(|t| t == "No reports found for Bob Santos."));
        assert!(
            !gateway.sent().iter().any(|s| matches!(s, Sent::Document { .. })),
            "no document may be produced"
        );
        assert_eq!(state_of(&dispatcher).await.state, MenuState::MenuShown);
    }

    #[tokio::test]
    async fn test_generate_for_missing_person_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, gateway) =
            dispatcher(MemoryCatalog::new(&[(1, "Alice Reyes")], &[]), dir.path());

        press(&dispatcher, "report_99").await;

        assert!(gateway
            .texts()
            .iter()
            .any(|t| t == "That person no longer exists."));
        assert_eq!(state_of(&dispatcher).await.state, MenuState::MenuShown);
    }

    #[tokio::test]
    async fn test_view_flow_lists_numbered_entries() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::new(
            &[(1, "Alice Reyes"), (2, "Bob Santos")],
            &[(1, &["Studied X", "Reviewed Y"])],
        );
        let (dispatcher, gateway) = dispatcher(catalog, dir.path());

        press(&dispatcher, "menu_view").await;
        assert_eq!(
            state_of(&dispatcher).await.state,
            MenuState::AwaitingPersonForView
        );
        match gateway.sent().last().unwrap() {
            Sent::Edit { text, buttons, .. } => {
                assert_eq!(text, "Select a user to view activities:");
                // Two persons plus Back.
                assert_eq!(buttons.len(), 3);
                assert_eq!(buttons[2].payload, "menu_back");
            }
            other => panic!("expected person listing, got {other:?}"),
        }

        press(&dispatcher, "view_1").await;
        match gateway.sent().last().unwrap() {
            Sent::Edit { text, buttons, .. } => {
                assert!(text.contains("Activities for Alice Reyes:"));
                assert!(text.contains("1. Studied X"));
                assert!(text.contains("2. Reviewed Y"));
                assert_eq!(buttons[0].payload, "add_1");
                assert_eq!(buttons[1].payload, "remove_1");
                assert_eq!(buttons[2].payload, "menu_back");
            }
            other => panic!("expected activities, got {other:?}"),
        }
        let session = state_of(&dispatcher).await;
        assert_eq!(session.state, MenuState::ViewingPersonOptions);
        assert_eq!(session.person, Some(1));
    }

    #[tokio::test]
    async fn test_view_person_without_entries() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, gateway) =
            dispatcher(MemoryCatalog::new(&[(1, "Alice Reyes")], &[]), dir.path());

        press(&dispatcher, "view_1").await;

        match gateway.sent().last().unwrap() {
            Sent::Edit { text, .. } => assert_eq!(text, "No reports for Alice Reyes."),
            other => panic!("expected notice, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_add_flow_inserts_non_empty_lines_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::new(&[(1, "Alice Reyes")], &[(1, &["Studied X"])]);
        let (dispatcher, gateway) = dispatcher(catalog, dir.path());

        press(&dispatcher, "add_1").await;
        let session = state_of(&dispatcher).await;
        assert_eq!(
            session.state,
            MenuState::AwaitingFreeText(PendingAction::Add)
        );
        assert_eq!(session.person, Some(1));

        send_text(&dispatcher, "Alpha\n\n  Beta  \n   \n").await;

        assert_eq!(
            dispatcher.catalog.entries_for(1),
            vec!["Studied X", "Alpha", "Beta"]
        );
        assert!(gateway
            .texts()
            .iter()
            .any(|t| t == "2 report(s) added successfully."));
        assert_eq!(state_of(&dispatcher).await.state, MenuState::MenuShown);
        assert_eq!(state_of(&dispatcher).await.person, None);
    }

    #[tokio::test]
    async fn test_remove_flow_deletes_selected_indices() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::new(&[(1, "Alice Reyes")], &[(1, &["A", "B", "C"])]);
        let (dispatcher, gateway) = dispatcher(catalog, dir.path());

        press(&dispatcher, "remove_1").await;
        match gateway.sent().last().unwrap() {
            Sent::Edit { text, .. } => {
                assert!(text.starts_with("Send the numbers of reports to remove"));
                assert!(text.contains("1. A") && text.contains("3. C"));
            }
            other => panic!("expected removal prompt, got {other:?}"),
        }

        send_text(&dispatcher, "1,3").await;

        assert_eq!(dispatcher.catalog.entries_for(1), vec!["B"]);
        assert!(gateway
            .texts()
            .iter()
            .any(|t| t == "2 report(s) removed successfully."));
        assert_eq!(state_of(&dispatcher).await.state, MenuState::MenuShown);
    }

    #[tokio::test]
    async fn test_remove_ignores_bad_tokens_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::new(&[(1, "Alice Reyes")], &[(1, &["A", "B", "C"])]);
        let (dispatcher, gateway) = dispatcher(catalog, dir.path());

        press(&dispatcher, "remove_1").await;
        send_text(&dispatcher, "5").await;
        assert_eq!(dispatcher.catalog.entries_for(1), vec!["A", "B", "C"]);
        assert!(gateway
            .texts()
            .iter()
            .any(|t| t == "0 report(s) removed successfully."));

        press(&dispatcher, "remove_1").await;
        send_text(&dispatcher, "abc").await;
        assert_eq!(dispatcher.catalog.entries_for(1), vec!["A", "B", "C"]);

        press(&dispatcher, "remove_1").await;
        send_text(&dispatcher, "2, 2, x").await;
        assert_eq!(dispatcher.catalog.entries_for(1), vec!["A", "C"]);
        assert!(gateway
            .texts()
            .iter()
            .any(|t| t == "1 report(s) removed successfully."));
    }

    #[tokio::test]
    async fn test_remove_with_no_entries_returns_to_menu() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, gateway) =
            dispatcher(MemoryCatalog::new(&[(1, "Alice Reyes")], &[]), dir.path());

        press(&dispatcher, "remove_1").await;

        assert!(gateway
            .texts()
            .iter()
            .any(|t| t == "No reports to remove for this user."));
        assert_eq!(state_of(&dispatcher).await.state, MenuState::MenuShown);
    }

    #[tokio::test]
    async fn test_stray_text_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, gateway) =
            dispatcher(MemoryCatalog::new(&[(1, "Alice Reyes")], &[]), dir.path());

        send_text(&dispatcher, "hello?").await;

        assert!(gateway.sent().is_empty(), "no reply expected");
        assert_eq!(state_of(&dispatcher).await.state, MenuState::MenuShown);
    }

    #[tokio::test]
    async fn test_back_clears_pending_state() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::new(&[(1, "Alice Reyes")], &[(1, &["A"])]);
        let (dispatcher, gateway) = dispatcher(catalog, dir.path());

        press(&dispatcher, "add_1").await;
        press(&dispatcher, "menu_back").await;

        let session = state_of(&dispatcher).await;
        assert_eq!(session.state, MenuState::MenuShown);
        assert_eq!(session.person, None);
        match gateway.sent().last().unwrap() {
            Sent::Edit { text, .. } => assert_eq!(text, "Select an option:"),
            other => panic!("expected menu, got {other:?}"),
        }

        // The abandoned pending action stays cleared: text is now ignored.
        send_text(&dispatcher, "orphan line").await;
        assert_eq!(dispatcher.catalog.entries_for(1), vec!["A"]);
    }

    #[tokio::test]
    async fn test_delivery_failure_never_aborts_the_flow() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::new(&[(1, "Alice Reyes")], &[(1, &["A"])]);
        let (dispatcher, gateway) = dispatcher(catalog, dir.path());

        press(&dispatcher, "add_1").await;
        gateway.fail_all.store(true, Ordering::Relaxed);

        send_text(&dispatcher, "Beta").await;

        // The insert happened and the session still came back to the menu,
        // even though every outbound message failed.
        assert_eq!(dispatcher.catalog.entries_for(1), vec!["A", "Beta"]);
        assert_eq!(state_of(&dispatcher).await.state, MenuState::MenuShown);
    }
}

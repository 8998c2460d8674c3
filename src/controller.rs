//! Upload/result controller state.
//!
//! Everything here is DOM-free. The view owns one `Controller` inside a local
//! signal and calls into it from event handlers; the file handle type is a
//! parameter so the state machine can be exercised without a browser.

use std::sync::Arc;

use crate::error::{Result, TryOnError};
use crate::image::{ImageMeta, Role};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SubmissionState {
    #[default]
    Idle,
    Submitting,
    Succeeded,
    Failed,
}

impl SubmissionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionState::Idle => "idle",
            SubmissionState::Submitting => "submitting",
            SubmissionState::Succeeded => "succeeded",
            SubmissionState::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Slot<F> {
    pub file: F,
    pub meta: ImageMeta,
    pub preview: Option<Arc<str>>,
    pick: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub message: String,
}

/// Handed out by [`Controller::begin_submit`]; carries what the request needs.
#[derive(Clone, Debug)]
pub struct Submission<F> {
    pub generation: u64,
    pub person: F,
    pub clothing: F,
}

/// What happened when a response was applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Applied {
    /// The result is now shown.
    Rendered,
    /// The error is now shown under this notice id.
    Failed(u64),
    /// The submission belongs to an earlier generation and was dropped.
    Stale,
}

#[derive(Clone, Debug)]
pub struct Controller<F> {
    person: Option<Slot<F>>,
    clothing: Option<Slot<F>>,
    submission: SubmissionState,
    in_flight: Option<u64>,
    generation: u64,
    result: Option<Arc<str>>,
    error: Option<Notice>,
    next_pick: u64,
    person_pick: u64,
    clothing_pick: u64,
    next_notice: u64,
}

impl<F> Default for Controller<F> {
    fn default() -> Self {
        Self {
            person: None,
            clothing: None,
            submission: SubmissionState::Idle,
            in_flight: None,
            generation: 0,
            result: None,
            error: None,
            next_pick: 0,
            person_pick: 0,
            clothing_pick: 0,
            next_notice: 0,
        }
    }
}

impl<F: Clone> Controller<F> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<Slot<F>> {
        match role {
            Role::Person => &mut self.person,
            Role::Clothing => &mut self.clothing,
        }
    }

    pub fn slot(&self, role: Role) -> Option<&Slot<F>> {
        match role {
            Role::Person => self.person.as_ref(),
            Role::Clothing => self.clothing.as_ref(),
        }
    }

    fn latest_pick_mut(&mut self, role: Role) -> &mut u64 {
        match role {
            Role::Person => &mut self.person_pick,
            Role::Clothing => &mut self.clothing_pick,
        }
    }

    /// Registers a file pick for `role` before it is validated.
    ///
    /// Only the most recent pick of a role may still land; an earlier pick
    /// or one made before a reset is ignored by [`Controller::select`],
    /// [`Controller::reject`] and [`Controller::set_preview`].
    pub fn begin_pick(&mut self, role: Role) -> u64 {
        self.next_pick += 1;
        let pick = self.next_pick;
        *self.latest_pick_mut(role) = pick;
        pick
    }

    pub fn is_current_pick(&self, role: Role, pick: u64) -> bool {
        let latest = match role {
            Role::Person => self.person_pick,
            Role::Clothing => self.clothing_pick,
        };
        pick != 0 && latest == pick
    }

    /// Stores a validated file, replacing whatever the role held.
    ///
    /// Returns `false` without touching anything when `pick` was superseded.
    pub fn select(&mut self, role: Role, pick: u64, file: F, meta: ImageMeta) -> bool {
        if !self.is_current_pick(role, pick) {
            tracing::debug!(%role, pick, "dropping superseded selection");
            return false;
        }
        tracing::debug!(%role, name = %meta.name, size = meta.size, pick, "image selected");
        *self.slot_mut(role) = Some(Slot {
            file,
            meta,
            preview: None,
            pick,
        });
        self.hide_error();
        true
    }

    /// Shows the error of a failed pick unless a newer pick or a reset
    /// happened since. Returns the notice id when shown.
    pub fn reject(&mut self, role: Role, pick: u64, err: TryOnError) -> Option<u64> {
        if !self.is_current_pick(role, pick) {
            tracing::debug!(%role, pick, %err, "dropping error of superseded selection");
            return None;
        }
        Some(self.show_error(err.to_string()))
    }

    /// Attaches a decoded preview. Ignored when the slot changed meanwhile.
    pub fn set_preview(&mut self, role: Role, pick: u64, url: String) -> bool {
        match self.slot_mut(role) {
            Some(slot) if slot.pick == pick => {
                slot.preview = Some(Arc::from(url));
                true
            }
            _ => false,
        }
    }

    pub fn has_both(&self) -> bool {
        self.person.is_some() && self.clothing.is_some()
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn can_submit(&self) -> bool {
        self.has_both() && !self.is_submitting()
    }

    /// Whether the loading indicator should show. A request that was
    /// superseded by a reset keeps the trigger disabled but shows no spinner.
    pub fn is_loading(&self) -> bool {
        self.in_flight == Some(self.generation)
    }

    pub fn submission(&self) -> SubmissionState {
        self.submission
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    /// Cheap handle on the result for the view.
    pub fn shared_result(&self) -> Option<Arc<str>> {
        self.result.clone()
    }

    pub fn error(&self) -> Option<&Notice> {
        self.error.as_ref()
    }

    pub fn begin_submit(&mut self) -> Result<Submission<F>> {
        if self.is_submitting() {
            return Err(TryOnError::Busy);
        }
        let (Some(person), Some(clothing)) = (&self.person, &self.clothing) else {
            return Err(TryOnError::MissingImages);
        };
        let person = person.file.clone();
        let clothing = clothing.file.clone();

        self.generation += 1;
        self.in_flight = Some(self.generation);
        self.submission = SubmissionState::Submitting;
        self.result = None;
        self.hide_error();

        Ok(Submission {
            generation: self.generation,
            person,
            clothing,
        })
    }

    /// Applies the outcome of the request started under `generation`.
    pub fn complete(&mut self, generation: u64, outcome: Result<String>) -> Applied {
        if generation != self.generation {
            tracing::info!(generation, current = self.generation, "dropping stale try-on response");
            return Applied::Stale;
        }
        match outcome {
            Ok(image) => {
                self.render_result(image);
                Applied::Rendered
            }
            Err(err) => {
                self.submission = SubmissionState::Failed;
                Applied::Failed(self.show_error(err.to_string()))
            }
        }
    }

    /// Releases the trigger for `generation`. Runs on every exit path of a
    /// submission, including ones that never reached [`Controller::complete`].
    ///
    /// Returns a notice id when the submission had to be marked as failed.
    pub fn settle(&mut self, generation: u64) -> Option<u64> {
        if self.in_flight == Some(generation) {
            self.in_flight = None;
        }
        if generation == self.generation && self.submission == SubmissionState::Submitting {
            self.submission = SubmissionState::Failed;
            return Some(self.show_error(TryOnError::Interrupted.to_string()));
        }
        None
    }

    pub fn render_result(&mut self, image: String) {
        self.result = Some(Arc::from(image));
        self.submission = SubmissionState::Succeeded;
        self.hide_error();
    }

    pub fn download_target(&self) -> Result<&str> {
        self.result
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or(TryOnError::NoResult)
    }

    /// Clears selections, previews, result and error, and voids every pick
    /// still being validated.
    ///
    /// An outstanding request is not cancelled: its response will be stale
    /// and the trigger stays disabled until it settles.
    pub fn reset(&mut self) {
        self.person = None;
        self.clothing = None;
        self.result = None;
        self.error = None;
        self.submission = SubmissionState::Idle;
        self.generation += 1;
        self.person_pick = 0;
        self.clothing_pick = 0;
    }

    /// Replaces the visible error. Returns the id its dismiss timer must use.
    pub fn show_error(&mut self, message: impl Into<String>) -> u64 {
        self.next_notice += 1;
        let message = message.into();
        tracing::warn!(notice = self.next_notice, %message, "showing error");
        self.error = Some(Notice {
            id: self.next_notice,
            message,
        });
        self.next_notice
    }

    pub fn hide_error(&mut self) {
        self.error = None;
    }

    /// Timer callback: hides the error only if it is still notice `id`.
    pub fn dismiss_error(&mut self, id: u64) {
        if self.error.as_ref().is_some_and(|n| n.id == id) {
            self.error = None;
        }
    }
}

/// Runs a closure when dropped.
pub struct OnExit<C: FnOnce()> {
    f: Option<C>,
}

impl<C: FnOnce()> OnExit<C> {
    pub fn new(f: C) -> Self {
        Self { f: Some(f) }
    }
}

impl<C: FnOnce()> Drop for OnExit<C> {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Clone, Debug, PartialEq)]
    struct FakeFile(&'static str);

    fn meta(name: &str) -> ImageMeta {
        ImageMeta {
            name: name.into(),
            mime: "image/png".into(),
            size: 1024,
        }
    }

    fn pick(c: &mut Controller<FakeFile>, role: Role, name: &'static str) -> u64 {
        let p = c.begin_pick(role);
        assert!(c.select(role, p, FakeFile(name), meta(name)));
        p
    }

    fn with_both() -> Controller<FakeFile> {
        let mut c = Controller::new();
        pick(&mut c, Role::Person, "me.png");
        pick(&mut c, Role::Clothing, "shirt.png");
        c
    }

    #[test]
    fn trigger_needs_both_roles() {
        let mut c: Controller<FakeFile> = Controller::new();
        assert!(!c.can_submit());
        pick(&mut c, Role::Person, "a");
        assert!(!c.can_submit());
        pick(&mut c, Role::Clothing, "b");
        assert!(c.can_submit());
    }

    #[test]
    fn reselect_replaces_slot() {
        let mut c = with_both();
        pick(&mut c, Role::Person, "other.png");
        assert_eq!(c.slot(Role::Person).unwrap().file, FakeFile("other.png"));
        assert_eq!(c.slot(Role::Clothing).unwrap().file, FakeFile("shirt.png"));
    }

    #[test]
    fn submit_without_both_issues_nothing() {
        let mut c: Controller<FakeFile> = Controller::new();
        pick(&mut c, Role::Clothing, "b");
        assert_eq!(c.begin_submit().unwrap_err(), TryOnError::MissingImages);
        assert_eq!(c.submission(), SubmissionState::Idle);
        assert!(!c.is_submitting());
    }

    #[test]
    fn success_renders_exact_payload() {
        let mut c = with_both();
        let sub = c.begin_submit().unwrap();
        assert_eq!(sub.person, FakeFile("me.png"));
        assert_eq!(sub.clothing, FakeFile("shirt.png"));
        assert!(!c.can_submit());
        assert_eq!(c.submission(), SubmissionState::Submitting);

        let applied = c.complete(sub.generation, Ok("data:image/png;base64,AAAA".into()));
        c.settle(sub.generation);

        assert_eq!(applied, Applied::Rendered);
        assert_eq!(c.result(), Some("data:image/png;base64,AAAA"));
        assert_eq!(c.submission(), SubmissionState::Succeeded);
        assert!(c.can_submit());
    }

    #[test]
    fn failure_surfaces_message_and_keeps_selections() {
        let mut c = with_both();
        let sub = c.begin_submit().unwrap();
        let applied = c.complete(sub.generation, Err(TryOnError::Server("bad input".into())));
        c.settle(sub.generation);

        assert!(matches!(applied, Applied::Failed(_)));
        assert_eq!(
            c.error().unwrap().message,
            "Failed to process virtual try-on: bad input"
        );
        assert_eq!(c.submission(), SubmissionState::Failed);
        assert!(c.slot(Role::Person).is_some());
        assert!(c.can_submit());
    }

    #[test]
    fn new_submission_clears_previous_result_and_error() {
        let mut c = with_both();
        let first = c.begin_submit().unwrap();
        c.complete(first.generation, Ok("data:image/png;base64,AAAA".into()));
        c.settle(first.generation);
        c.show_error("stale");

        let second = c.begin_submit().unwrap();
        assert!(c.result().is_none());
        assert!(c.error().is_none());
        assert!(second.generation > first.generation);
    }

    #[test]
    fn second_submit_while_in_flight_is_refused() {
        let mut c = with_both();
        c.begin_submit().unwrap();
        assert_eq!(c.begin_submit().unwrap_err(), TryOnError::Busy);
    }

    #[test]
    fn settle_without_outcome_marks_failure() {
        let mut c = with_both();
        let sub = c.begin_submit().unwrap();
        let notice = c.settle(sub.generation);
        assert!(notice.is_some());
        assert_eq!(c.submission(), SubmissionState::Failed);
        assert!(c.can_submit());
    }

    #[test]
    fn guard_settles_on_early_return() {
        let mut c = with_both();
        let sub = c.begin_submit().unwrap();
        let settled = Cell::new(false);

        let run = |fail: bool| -> Result<()> {
            let _restore = OnExit::new(|| settled.set(true));
            if fail {
                return Err(TryOnError::Network("offline".into()));
            }
            Ok(())
        };
        assert!(run(true).is_err());
        assert!(settled.get());

        c.complete(sub.generation, Err(TryOnError::Network("offline".into())));
        c.settle(sub.generation);
        assert!(!c.is_submitting());
    }

    #[test]
    fn reset_clears_everything_visible() {
        let mut c = with_both();
        let sub = c.begin_submit().unwrap();
        c.complete(sub.generation, Ok("data:image/png;base64,AAAA".into()));
        c.settle(sub.generation);
        c.show_error("boom");

        c.reset();
        assert!(c.slot(Role::Person).is_none());
        assert!(c.slot(Role::Clothing).is_none());
        assert!(c.result().is_none());
        assert!(c.error().is_none());
        assert_eq!(c.submission(), SubmissionState::Idle);
        assert!(!c.can_submit());

        pick(&mut c, Role::Person, "a");
        pick(&mut c, Role::Clothing, "b");
        assert!(c.can_submit());
    }

    #[test]
    fn response_after_reset_is_ignored() {
        let mut c = with_both();
        let sub = c.begin_submit().unwrap();
        c.reset();
        pick(&mut c, Role::Person, "a");
        pick(&mut c, Role::Clothing, "b");
        // still waiting on the old request
        assert!(!c.can_submit());

        assert_eq!(
            c.complete(sub.generation, Ok("data:image/png;base64,AAAA".into())),
            Applied::Stale
        );
        assert_eq!(c.settle(sub.generation), None);
        assert!(c.result().is_none());
        assert!(c.error().is_none());
        assert_eq!(c.submission(), SubmissionState::Idle);
        assert!(c.can_submit());
    }

    #[test]
    fn stale_preview_is_dropped() {
        let mut c: Controller<FakeFile> = Controller::new();
        let first = pick(&mut c, Role::Person, "a");
        let second = pick(&mut c, Role::Person, "b");
        assert!(!c.set_preview(Role::Person, first, "data:a".into()));
        assert!(c.set_preview(Role::Person, second, "data:b".into()));
        assert_eq!(
            c.slot(Role::Person).unwrap().preview.as_deref(),
            Some("data:b")
        );

        c.reset();
        assert!(!c.is_current_pick(Role::Person, second));
        assert!(!c.set_preview(Role::Person, second, "data:b".into()));
    }

    #[test]
    fn newer_notice_survives_older_timer() {
        let mut c: Controller<FakeFile> = Controller::new();
        let old = c.show_error("first");
        let new = c.show_error("second");
        c.dismiss_error(old);
        assert_eq!(c.error().unwrap().message, "second");
        c.dismiss_error(new);
        assert!(c.error().is_none());
    }

    #[test]
    fn selection_hides_error() {
        let mut c: Controller<FakeFile> = Controller::new();
        c.show_error("Image size should be less than 20MB.");
        pick(&mut c, Role::Person, "a");
        assert!(c.error().is_none());
    }

    #[test]
    fn earlier_pick_finishing_late_is_dropped() {
        let mut c: Controller<FakeFile> = Controller::new();
        let slow = c.begin_pick(Role::Person);
        let fast = c.begin_pick(Role::Person);
        assert!(c.select(Role::Person, fast, FakeFile("fast.png"), meta("fast.png")));

        assert!(!c.select(Role::Person, slow, FakeFile("slow.heic"), meta("slow.heic")));
        assert_eq!(c.slot(Role::Person).unwrap().file, FakeFile("fast.png"));
        assert!(!c.set_preview(Role::Person, slow, "data:slow".into()));
        assert!(c.slot(Role::Person).unwrap().preview.is_none());
    }

    #[test]
    fn pick_pending_across_reset_is_dropped() {
        let mut c = with_both();
        let pending = c.begin_pick(Role::Clothing);
        c.reset();

        assert!(!c.select(Role::Clothing, pending, FakeFile("late.png"), meta("late.png")));
        assert!(c.slot(Role::Clothing).is_none());
        assert_eq!(c.reject(Role::Clothing, pending, TryOnError::UnsupportedType), None);
        assert!(c.error().is_none());
    }

    #[test]
    fn late_rejection_does_not_cover_newer_selection() {
        let mut c: Controller<FakeFile> = Controller::new();
        let bad = c.begin_pick(Role::Person);
        pick(&mut c, Role::Person, "good.png");

        assert_eq!(c.reject(Role::Person, bad, TryOnError::UnsupportedType), None);
        assert!(c.error().is_none());
        assert_eq!(c.slot(Role::Person).unwrap().file, FakeFile("good.png"));
    }

    #[test]
    fn current_rejection_is_shown_and_keeps_prior_selection() {
        let mut c: Controller<FakeFile> = Controller::new();
        pick(&mut c, Role::Person, "good.png");
        let bad = c.begin_pick(Role::Person);

        assert!(c.reject(Role::Person, bad, TryOnError::TooLarge { limit_mb: 20 }).is_some());
        assert_eq!(
            c.error().unwrap().message,
            "Image size should be less than 20MB."
        );
        assert_eq!(c.slot(Role::Person).unwrap().file, FakeFile("good.png"));
    }

    #[test]
    fn spinner_follows_current_generation_only() {
        let mut c = with_both();
        let sub = c.begin_submit().unwrap();
        assert!(c.is_loading());

        c.reset();
        assert!(!c.is_loading());
        assert!(c.is_submitting());

        c.settle(sub.generation);
        assert!(!c.is_loading());
        assert!(!c.is_submitting());
    }

    #[test]
    fn result_handle_shares_payload() {
        let mut c = with_both();
        c.render_result("data:image/png;base64,AAAA".into());
        let a = c.shared_result().unwrap();
        let b = c.shared_result().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn download_requires_result() {
        let mut c = with_both();
        assert_eq!(c.download_target().unwrap_err(), TryOnError::NoResult);
        c.render_result("data:image/png;base64,AAAA".into());
        assert_eq!(c.download_target().unwrap(), "data:image/png;base64,AAAA");
    }
}

//! Slack Block Kit message builders.
//!
//! Root messages are rendered from the task's current status, so every
//! handler re-renders the whole message after a mutation instead of
//! patching individual blocks.

use chrono::DateTime;
use chrono_tz::Tz;
use slack_morphism::prelude::{
    SlackActionBlockElement, SlackActionsBlock, SlackBlock, SlackBlockButtonElement, SlackBlockId,
    SlackBlockPlainTextOnly, SlackBlockText, SlackContextBlock, SlackContextBlockElement,
    SlackSectionBlock,
};

use crate::models::{ReviewTask, TaskStatus};

/// Action id of the legacy "take" button.
pub const ACTION_TAKE: &str = "review_take";
/// Action id of the "I'm looking" button.
pub const ACTION_WATCH: &str = "review_watch";
/// Action id of the rotate-reviewer button.
pub const ACTION_CHANGE_REVIEWER: &str = "change_reviewer";
/// Prefix shared by every pause button.
pub const ACTION_PAUSE_PREFIX: &str = "pause_reminder";

const PAUSE_OPTIONS: [(&str, &str); 5] = [
    ("1h", "Pause 1h"),
    ("2h", "Pause 2h"),
    ("4h", "Pause 4h"),
    ("today", "Until next morning"),
    ("stop", "Stop reminders"),
];

/// Build a plain markdown section block.
#[must_use]
pub fn text_section(text: &str) -> SlackBlock {
    SlackBlock::Section(SlackSectionBlock::new().with_text(SlackBlockText::MarkDown(text.into())))
}

/// Build a muted context line.
#[must_use]
pub fn context_line(text: &str) -> SlackBlock {
    SlackBlock::Context(SlackContextBlock::new(vec![
        SlackContextBlockElement::MarkDown(text.into()),
    ]))
}

/// Build an actions block with the given `(action_id, label, value)` buttons.
#[must_use]
pub fn action_buttons(block_id: &str, buttons: &[(&str, &str, &str)]) -> SlackBlock {
    let elements: Vec<SlackActionBlockElement> = buttons
        .iter()
        .map(|(action_id, text, value)| {
            SlackActionBlockElement::Button(
                SlackBlockButtonElement::new(
                    (*action_id).into(),
                    SlackBlockPlainTextOnly::from(*text),
                )
                .with_value((*value).into()),
            )
        })
        .collect();
    SlackBlock::Actions(
        SlackActionsBlock::new(elements).with_block_id(SlackBlockId(block_id.into())),
    )
}

/// Leading section that pings a user.
#[must_use]
pub fn mention_section(user: &str) -> SlackBlock {
    text_section(&format!("<@{user}> please take a look"))
}

/// Value carried by a pause button: `<task_id>:<spec>`.
#[must_use]
pub fn pause_value(task_id: &str, spec: &str) -> String {
    format!("{task_id}:{spec}")
}

/// Row of pause buttons for a task.
#[must_use]
pub fn pause_buttons(task_id: &str) -> SlackBlock {
    let ids: Vec<(String, &str, String)> = PAUSE_OPTIONS
        .iter()
        .map(|(spec, label)| {
            (
                format!("{ACTION_PAUSE_PREFIX}_{spec}"),
                *label,
                pause_value(task_id, spec),
            )
        })
        .collect();
    let buttons: Vec<(&str, &str, &str)> = ids
        .iter()
        .map(|(id, label, value)| (id.as_str(), *label, value.as_str()))
        .collect();
    action_buttons(&format!("pause_{task_id}"), &buttons)
}

fn headline(task: &ReviewTask) -> String {
    format!(
        "*<{}|{}>*\n`{}` #{}",
        task.pr_url, task.title, task.repo, task.pr_number
    )
}

fn local_time(at: DateTime<chrono::Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%m/%d %H:%M %Z").to_string()
}

/// Root message for a task in its current status.
///
/// `tz` is the owning channel's zone and only affects how pause and watch
/// deadlines are displayed.
#[must_use]
pub fn task_blocks(task: &ReviewTask, tz: Tz) -> Vec<SlackBlock> {
    let mut out = vec![text_section(&headline(task))];
    let id = task.id.as_str();

    match task.status {
        TaskStatus::InReview => {
            out.push(context_line(&format!("Reviewer: <@{}>", task.reviewer)));
            if let Some(until) = task.reminder_paused_until {
                out.push(context_line(&format!(
                    "Reminders paused until {}",
                    local_time(until, tz)
                )));
            }
            out.push(action_buttons(
                &format!("task_{id}"),
                &[
                    (ACTION_WATCH, "I'm on it", id),
                    (ACTION_CHANGE_REVIEWER, "Change reviewer", id),
                ],
            ));
            out.push(pause_buttons(id));
        }
        TaskStatus::Pending => {
            let line = if task.reviewer.is_empty() {
                "Needs a reviewer".to_owned()
            } else {
                format!("Taken by <@{}>", task.reviewer)
            };
            out.push(context_line(&line));
            out.push(action_buttons(
                &format!("task_{id}"),
                &[
                    (ACTION_TAKE, "Take review", id),
                    (ACTION_WATCH, "I'm on it", id),
                ],
            ));
            out.push(pause_buttons(id));
        }
        TaskStatus::WaitingBusinessHours => {
            out.push(context_line(
                "Posted outside business hours; a reviewer will be assigned when the day starts.",
            ));
        }
        TaskStatus::Watching => {
            let until = task
                .watching_until
                .map(|at| format!(" until {}", local_time(at, tz)))
                .unwrap_or_default();
            out.push(context_line(&format!(
                ":eyes: <@{}> is reviewing{until}",
                task.reviewer
            )));
        }
        TaskStatus::Snoozed => {
            out.push(context_line(":zzz: Reminders stopped for this review."));
        }
        TaskStatus::Completed => {
            out.push(context_line(":white_check_mark: Review complete."));
        }
        TaskStatus::Archived => {
            out.push(context_line("Archived."));
        }
    }
    out
}

/// Thread note announcing the assignee, with a rotate control.
#[must_use]
pub fn assignee_note(task: &ReviewTask) -> Vec<SlackBlock> {
    vec![
        text_section(&format!("<@{}> has been assigned as reviewer.", task.reviewer)),
        action_buttons(
            &format!("assignee_{}", task.id),
            &[(ACTION_CHANGE_REVIEWER, "Change reviewer", task.id.as_str())],
        ),
    ]
}

/// Thread note listing the labels that are no longer on the pull request.
#[must_use]
pub fn missing_labels_note(missing: &[String]) -> Vec<SlackBlock> {
    let labels = missing
        .iter()
        .map(|l| format!("`{l}`"))
        .collect::<Vec<_>>()
        .join(", ");
    vec![text_section(&format!(
        "Label removed ({labels}); closing this review request."
    ))]
}

/// Thread note for a submitted review.
#[must_use]
pub fn review_submitted_note(reviewer: &str, state: &str) -> Vec<SlackBlock> {
    let verb = match state {
        "approved" => ":white_check_mark: approved",
        "changes_requested" => ":memo: requested changes on",
        _ => ":speech_balloon: commented on",
    };
    vec![text_section(&format!("*{reviewer}* {verb} this pull request."))]
}

/// Thread note confirming a pause.
#[must_use]
pub fn pause_confirmation(actor: &str, spec: &str, until: Option<DateTime<Tz>>) -> Vec<SlackBlock> {
    let text = match (spec, until) {
        ("stop", _) => format!("<@{actor}> stopped reminders for this review."),
        (_, Some(until)) => format!(
            "<@{actor}> paused reminders until {}.",
            until.format("%m/%d %H:%M %Z")
        ),
        (_, None) => format!("<@{actor}> paused reminders."),
    };
    vec![text_section(&text)]
}

/// Reminder for a task nobody has picked up.
#[must_use]
pub fn reminder_needs_reviewer() -> Vec<SlackBlock> {
    vec![text_section(
        ":bell: This pull request still needs a reviewer.",
    )]
}

/// Nudge for the assigned reviewer.
#[must_use]
pub fn reminder_reviewer(reviewer: &str) -> Vec<SlackBlock> {
    vec![text_section(&format!(
        ":bell: <@{reviewer}> friendly reminder: this review is still waiting."
    ))]
}

/// One-shot reminder sent outside business hours.
#[must_use]
pub fn reminder_out_of_hours(reviewer: &str, resume: DateTime<Tz>) -> Vec<SlackBlock> {
    vec![text_section(&format!(
        ":crescent_moon: <@{reviewer}> this review is still open. \
         Reminders resume {}.",
        resume.format("%m/%d %H:%M %Z")
    ))]
}

/// Thread note when a watch window lapses.
#[must_use]
pub fn watch_expired_note(reviewer: &str) -> Vec<SlackBlock> {
    vec![text_section(&format!(
        "<@{reviewer}> the watch window ended; reminders are back on."
    ))]
}

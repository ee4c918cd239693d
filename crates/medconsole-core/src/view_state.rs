use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::MonthCursor;
use crate::datetime::DateRange;
use crate::model::{Channel, QueueStatus};
use crate::notifications::QueueFilter;
use crate::query::Toast;

/// Everything the console page keeps between renders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsoleView {
    pub cursor: MonthCursor,
    pub appointment_range: DateRange,
    pub queue_filter: QueueFilter,
    pub queue_page: usize,
    pub status_modal: Option<String>,
    pub toast: Option<Toast>,
}

impl ConsoleView {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            cursor: MonthCursor::containing(today),
            appointment_range: DateRange::All,
            queue_filter: QueueFilter::default(),
            queue_page: 1,
            status_modal: None,
            toast: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    PrevMonth,
    NextMonth,
    SetAppointmentRange(DateRange),
    SetQueueRange(DateRange),
    SetChannel(Option<Channel>),
    SetProvider(Option<String>),
    SetStatus(Option<QueueStatus>),
    SetQueuePage(usize),
    ResetQueueFilter,
    OpenStatusModal(String),
    CloseStatusModal,
    ShowToast(Toast),
    DismissToast,
}

#[must_use]
pub fn reduce(state: &ConsoleView, action: Action) -> ConsoleView {
    let mut next = state.clone();
    match action {
        Action::PrevMonth => next.cursor = state.cursor.prev(),
        Action::NextMonth => next.cursor = state.cursor.next(),
        Action::SetAppointmentRange(range) => next.appointment_range = range,
        Action::SetQueueRange(range) => {
            next.queue_filter.range = range;
            next.queue_page = 1;
        }
        Action::SetChannel(channel) => {
            next.queue_filter.channel = channel;
            next.queue_page = 1;
        }
        Action::SetProvider(provider) => {
            next.queue_filter.provider = provider.filter(|p| !p.trim().is_empty());
            next.queue_page = 1;
        }
        Action::SetStatus(status) => {
            next.queue_filter.status = status;
            next.queue_page = 1;
        }
        Action::SetQueuePage(page) => next.queue_page = page.max(1),
        Action::ResetQueueFilter => {
            next.queue_filter = QueueFilter::default();
            next.queue_page = 1;
        }
        Action::OpenStatusModal(id) => next.status_modal = Some(id),
        Action::CloseStatusModal => next.status_modal = None,
        Action::ShowToast(toast) => next.toast = Some(toast),
        Action::DismissToast => next.toast = None,
    }
    next
}

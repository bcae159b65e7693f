//! Event loop around [`Explorer`].
//!
//! Every input (map events, position fixes, user actions, network completions)
//! is a [`Msg`]. A single task owns the explorer and applies messages in order;
//! side effects are queued as [`Cmd`]s and run on spawned tasks that post their
//! result back as another message.

use std::{sync::Arc, time::Duration};

use shared::{Camera, Destination, GeoPoint, Route, SearchResult, SessionSnapshot};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    error::ServiceError,
    explorer::Explorer,
    fog::FogFrame,
    location::{PositionSource, PositionUpdate, Subscription},
    navigation::{NavigationError, RouteTicket},
    proximity::CompletionError,
    routing::RouteProvider,
    search::Geocoder,
    viewport::MapEngine,
};

const MAILBOX_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("explorer event loop has stopped")]
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error(transparent)]
    Quest(#[from] CompletionError),
    #[error("no search result at index {0}")]
    NoSuchResult(usize),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

type Ack<T = ()> = Option<oneshot::Sender<Result<T, ActionError>>>;

#[derive(Debug)]
pub enum Msg {
    MapLoaded,
    CameraChanged { camera: Camera, user_initiated: bool },
    Resized { width: u32, height: u32 },
    Position(PositionUpdate),
    SearchInput(String),
    SearchDebounced(u64),
    SearchResolved {
        token: u64,
        result: Result<Vec<SearchResult>, ServiceError>,
    },
    SelectSearchResult { index: usize, ack: Ack },
    SelectDestination { destination: Destination, ack: Ack },
    StartNavigation { ack: Ack },
    ExitNavigation,
    Recenter,
    RouteFetched {
        token: u64,
        result: Result<Route, ServiceError>,
    },
    CompleteQuest { quest_id: String, ack: Ack<bool> },
    Snapshot(oneshot::Sender<SessionSnapshot>),
    FogFrame(oneshot::Sender<FogFrame>),
    VisitedPath(oneshot::Sender<Vec<GeoPoint>>),
}

/// Side effects requested by [`update`].
#[derive(Debug, Clone, PartialEq)]
pub enum Cmd {
    Debounce { token: u64, delay: Duration },
    Geocode { token: u64, query: String },
    FetchRoute(RouteTicket),
}

#[derive(Debug, Default)]
pub struct Orders {
    cmds: Vec<Cmd>,
}

impl Orders {
    pub fn perform(&mut self, cmd: Cmd) {
        self.cmds.push(cmd);
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, Cmd> {
        self.cmds.drain(..)
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }
}

fn reply<T>(ack: Option<oneshot::Sender<T>>, value: T) {
    if let Some(ack) = ack {
        // Receiver may have given up; nothing to do.
        let _ = ack.send(value);
    }
}

pub fn update<E: MapEngine>(msg: Msg, explorer: &mut Explorer<E>, orders: &mut Orders) {
    match msg {
        Msg::MapLoaded => explorer.map_loaded(),
        Msg::CameraChanged {
            camera,
            user_initiated,
        } => explorer.camera_changed(camera, user_initiated),
        Msg::Resized { width, height } => explorer.resized(width, height),
        Msg::Position(update) => explorer.position_update(update),
        Msg::SearchInput(query) => {
            if let Some(ticket) = explorer.search_input(&query) {
                orders.perform(Cmd::Debounce {
                    token: ticket.token,
                    delay: explorer.search_debounce(),
                });
            }
        }
        Msg::SearchDebounced(token) => {
            if let Some(query) = explorer.search_debounced(token) {
                orders.perform(Cmd::Geocode { token, query });
            }
        }
        Msg::SearchResolved { token, result } => explorer.search_resolved(token, result),
        Msg::SelectSearchResult { index, ack } => {
            let result = match explorer.select_search_result(index) {
                Ok(true) => Ok(()),
                Ok(false) => Err(ActionError::NoSuchResult(index)),
                Err(err) => Err(err.into()),
            };
            reply(ack, result);
        }
        Msg::SelectDestination { destination, ack } => {
            let result = explorer.select_destination(destination).map_err(Into::into);
            reply(ack, result);
        }
        Msg::StartNavigation { ack } => {
            let result = explorer.start_navigation().map(|ticket| {
                orders.perform(Cmd::FetchRoute(ticket));
            });
            if let Err(err) = &result {
                tracing::warn!("cannot start navigation: {err}");
            }
            reply(ack, result.map_err(Into::into));
        }
        Msg::ExitNavigation => explorer.exit_navigation(),
        Msg::Recenter => explorer.recenter(),
        Msg::RouteFetched { token, result } => {
            explorer.route_resolved(token, result);
        }
        Msg::CompleteQuest { quest_id, ack } => {
            reply(ack, explorer.complete_quest(&quest_id).map_err(Into::into));
        }
        Msg::Snapshot(reply_to) => {
            let _ = reply_to.send(explorer.snapshot());
        }
        Msg::FogFrame(reply_to) => {
            let _ = reply_to.send(explorer.fog_frame().clone());
        }
        Msg::VisitedPath(reply_to) => {
            let _ = reply_to.send(explorer.visited_path().as_slice().to_vec());
        }
    }
}

/// Network backends used by commands.
#[derive(Clone)]
pub struct Services {
    pub geocoder: Arc<dyn Geocoder>,
    pub router: Arc<dyn RouteProvider>,
}

fn perform(cmd: Cmd, services: &Services, mailbox: &mpsc::WeakSender<Msg>) {
    let Some(tx) = mailbox.upgrade() else {
        return;
    };
    match cmd {
        Cmd::Debounce { token, delay } => {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(Msg::SearchDebounced(token)).await;
            });
        }
        Cmd::Geocode { token, query } => {
            let geocoder = Arc::clone(&services.geocoder);
            tokio::spawn(async move {
                let result = geocoder.search(&query).await;
                let _ = tx.send(Msg::SearchResolved { token, result }).await;
            });
        }
        Cmd::FetchRoute(ticket) => {
            let router = Arc::clone(&services.router);
            tokio::spawn(async move {
                let result = router.route(ticket.origin, ticket.destination).await;
                let _ = tx
                    .send(Msg::RouteFetched {
                        token: ticket.token,
                        result,
                    })
                    .await;
            });
        }
    }
}

/// Start the event loop. It stops once every [`ExplorerHandle`] is dropped.
pub fn spawn<E>(explorer: Explorer<E>, services: Services) -> (ExplorerHandle, JoinHandle<()>)
where
    E: MapEngine + 'static,
{
    let (tx, mut rx) = mpsc::channel(MAILBOX_CAPACITY);
    let mailbox = tx.downgrade();
    let task = tokio::spawn(async move {
        let mut explorer = explorer;
        let mut orders = Orders::default();
        while let Some(msg) = rx.recv().await {
            update(msg, &mut explorer, &mut orders);
            for cmd in orders.drain() {
                perform(cmd, &services, &mailbox);
            }
        }
        tracing::info!("explorer event loop stopped");
    });
    (ExplorerHandle { tx }, task)
}

/// Cloneable front door to a running explorer.
#[derive(Debug, Clone)]
pub struct ExplorerHandle {
    tx: mpsc::Sender<Msg>,
}

impl ExplorerHandle {
    pub async fn send(&self, msg: Msg) -> Result<(), RuntimeError> {
        self.tx.send(msg).await.map_err(|_| RuntimeError::Stopped)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Msg) -> Result<T, RuntimeError> {
        let (reply_to, response) = oneshot::channel();
        self.send(make(reply_to)).await?;
        response.await.map_err(|_| RuntimeError::Stopped)
    }

    async fn act<T>(&self, make: impl FnOnce(Ack<T>) -> Msg) -> Result<T, ActionError> {
        self.request(|reply_to| make(Some(reply_to))).await?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, RuntimeError> {
        self.request(Msg::Snapshot).await
    }

    pub async fn fog_frame(&self) -> Result<FogFrame, RuntimeError> {
        self.request(Msg::FogFrame).await
    }

    pub async fn visited_path(&self) -> Result<Vec<GeoPoint>, RuntimeError> {
        self.request(Msg::VisitedPath).await
    }

    pub async fn position(&self, update: PositionUpdate) -> Result<(), RuntimeError> {
        self.send(Msg::Position(update)).await
    }

    pub async fn camera_changed(&self, camera: Camera, user_initiated: bool) -> Result<(), RuntimeError> {
        self.send(Msg::CameraChanged {
            camera,
            user_initiated,
        })
        .await
    }

    pub async fn search(&self, query: impl Into<String>) -> Result<(), RuntimeError> {
        self.send(Msg::SearchInput(query.into())).await
    }

    pub async fn select_search_result(&self, index: usize) -> Result<(), ActionError> {
        self.act(|ack| Msg::SelectSearchResult { index, ack }).await
    }

    pub async fn select_destination(&self, destination: Destination) -> Result<(), ActionError> {
        self.act(|ack| Msg::SelectDestination { destination, ack })
            .await
    }

    pub async fn start_navigation(&self) -> Result<(), ActionError> {
        self.act(|ack| Msg::StartNavigation { ack }).await
    }

    pub async fn exit_navigation(&self) -> Result<(), RuntimeError> {
        self.send(Msg::ExitNavigation).await
    }

    pub async fn recenter(&self) -> Result<(), RuntimeError> {
        self.send(Msg::Recenter).await
    }

    pub async fn complete_quest(&self, quest_id: impl Into<String>) -> Result<bool, ActionError> {
        let quest_id = quest_id.into();
        self.act(|ack| Msg::CompleteQuest { quest_id, ack }).await
    }
}

/// Forward every update from `source` into the explorer, in order.
///
/// Updates queue up while the mailbox is full and are delivered once it drains.
pub fn attach_position_source(handle: &ExplorerHandle, source: &dyn PositionSource) -> Subscription {
    let (queue, mut pending) = mpsc::unbounded_channel::<PositionUpdate>();
    let handle = handle.clone();
    tokio::spawn(async move {
        while let Some(update) = pending.recv().await {
            if handle.position(update).await.is_err() {
                tracing::debug!("position update after event loop stopped");
                break;
            }
        }
    });
    source.subscribe(Box::new(move |update| {
        let _ = queue.send(update);
    }))
}

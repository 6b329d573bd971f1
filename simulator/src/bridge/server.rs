use crate::bridge::model::BridgeModel;
use crate::workflow::runner::{AnalysisReport, AnalysisRequest, Runner};
use anyhow::Context;
use log::{info, warn};
use serde_json::json;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use warp::{http::StatusCode, Filter, Rejection, Reply};

pub fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9000))
}

type SharedModel = Arc<RwLock<BridgeModel>>;

fn read(state: &RwLock<BridgeModel>) -> RwLockReadGuard<'_, BridgeModel> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

fn store(state: &RwLock<BridgeModel>, report: AnalysisReport) {
    state
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .record(report);
}

async fn analyze(
    request: AnalysisRequest,
    state: SharedModel,
    runner: Arc<Runner>,
) -> Result<impl Reply, Infallible> {
    let result = match tokio::task::spawn_blocking(move || runner.execute(&request)).await {
        Ok(result) => result,
        Err(err) => Err(anyhow::Error::new(err).context("analysis task aborted")),
    };
    match result {
        Ok(report) => {
            let reply = warp::reply::json(&report);
            store(&state, report);
            Ok(warp::reply::with_status(reply, StatusCode::OK))
        }
        Err(err) => {
            let message = format!("{:#}", err);
            warn!("analyze request rejected: {}", message);
            Ok(warp::reply::with_status(
                warp::reply::json(&json!({ "status": "error", "message": message })),
                StatusCode::UNPROCESSABLE_ENTITY,
            ))
        }
    }
}

/// JSON front end of the runner: `POST /analyze`, `GET /report` and
/// `GET /metrics`.
pub struct Bridge {
    state: SharedModel,
    runner: Arc<Runner>,
}

impl Bridge {
    pub fn new(runner: Runner) -> Self {
        Self {
            state: Arc::new(RwLock::new(BridgeModel::default())),
            runner: Arc::new(runner),
        }
    }

    pub fn routes(&self) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        let state = self.state.clone();
        let state_filter = warp::any().map(move || state.clone());
        let runner = self.runner.clone();
        let runner_filter = warp::any().map(move || runner.clone());

        let analyze_route = warp::path("analyze")
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::body::json())
            .and(state_filter.clone())
            .and(runner_filter.clone())
            .and_then(analyze);

        let report_route = warp::path("report")
            .and(warp::path::end())
            .and(warp::get())
            .and(state_filter)
            .map(|state: SharedModel| warp::reply::json(&*read(&state)));

        let metrics_route = warp::path("metrics")
            .and(warp::path::end())
            .and(warp::get())
            .and(runner_filter)
            .map(|runner: Arc<Runner>| warp::reply::json(&runner.metrics().snapshot()));

        analyze_route.or(report_route).or(metrics_route)
    }

    /// Makes an offline report visible through `GET /report`.
    pub fn publish(&self, report: AnalysisReport) {
        store(&self.state, report);
    }

    pub fn publish_status(&self, message: &str) {
        info!("{}", message);
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .status = message.to_string();
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> BridgeModel {
        read(&self.state).clone()
    }

    /// Serves the routes on `addr` until `shutdown` resolves.
    pub async fn serve<F>(&self, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (bound, server) = warp::serve(self.routes())
            .try_bind_with_graceful_shutdown(addr, shutdown)
            .with_context(|| format!("binding bridge to {}", addr))?;
        info!("bridge listening on http://{}", bound);
        server.await;
        Ok(())
    }
}

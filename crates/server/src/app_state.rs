use server_api::ApiContext;

use crate::coordinator::CoordinatorHandle;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) relay: CoordinatorHandle,
}

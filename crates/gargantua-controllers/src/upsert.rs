use gargantua_core::{
    retry,
    store::{Api, StoreResult},
};
use gargantua_model::Resource;

/// Create `desired`, or merge it into the existing object of the same name.
///
/// `merge` returns `true` if it changed the stored object.
pub async fn upsert<K, F>(api: &dyn Api<K>, desired: K, mut merge: F) -> StoreResult<K>
where
    K: Resource,
    F: FnMut(&mut K, &K) -> bool + Send,
{
    match api.create(desired.clone()).await {
        Err(e) if e.is_already_exists() => {
            let meta = desired.meta();
            retry::update_spec(api, &meta.namespace, &meta.name, |cur| merge(cur, &desired)).await
        }
        other => other,
    }
}

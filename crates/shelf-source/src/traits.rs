use shelf_types::{KeySelection, Metadata, ObjectId};

use crate::browse::{BrowseParams, BrowseResult};
use crate::error::{SourceError, SourceResult};
use crate::registry::BrowseId;

/// Receives the new item id, or the error that prevented creation.
pub type CreateCallback = Box<dyn FnOnce(Option<ObjectId>, Option<SourceError>)>;

/// Receives the id passed to `destroy_object` and the outcome.
pub type DestroyCallback = Box<dyn FnOnce(String, Option<SourceError>)>;

/// Receives the id, the keys that could not be written and the outcome.
pub type SetMetadataCallback = Box<dyn FnOnce(String, Vec<String>, Option<SourceError>)>;

/// Receives the id, the projected attributes and the outcome.
pub type GetMetadataCallback = Box<dyn FnOnce(String, Option<Metadata>, Option<SourceError>)>;

/// Called once per delivered browse result.
pub type BrowseCallback = Box<dyn FnMut(BrowseResult)>;

/// A flat source of attributed items.
///
/// Single-item operations report every failure through their callback;
/// validation failures call back before the method returns, everything else
/// from a later scheduler tick. `browse` is the exception: rejected
/// parameters are returned as `Err` and the callback is never called.
pub trait Source {
    /// The UUID prefixing every object id of this source.
    fn uuid(&self) -> &str;

    /// The root container id, `"<uuid>::"`.
    fn root_id(&self) -> ObjectId {
        ObjectId::root(self.uuid())
    }

    /// Create an item under the root. `attributes` must contain `uri`.
    fn create_object(&self, parent: &str, attributes: Metadata, callback: CreateCallback);

    /// Remove an item and all its attributes.
    fn destroy_object(&self, object_id: &str, callback: DestroyCallback);

    /// Replace the named attributes of an existing item.
    fn set_metadata(&self, object_id: &str, attributes: Metadata, callback: SetMetadataCallback);

    /// Read attributes of an item, or the synthesized ones of the root.
    fn get_metadata(&self, object_id: &str, keys: &KeySelection, callback: GetMetadataCallback);

    /// Start a browse of the root container.
    fn browse(&self, params: BrowseParams, callback: BrowseCallback) -> SourceResult<BrowseId>;

    /// Stop an active browse. No callback for it fires afterwards.
    fn cancel_browse(&self, browse_id: BrowseId) -> SourceResult<()>;
}

//! Draft drain.

use chrono::Utc;
use tracing::{debug, warn};

use super::SyncEngine;
use crate::remote::{AssetUpload, NewPoll};
use crate::store::{DraftImage, DraftOption, PendingDraft};

impl SyncEngine {
  pub(super) async fn drain_drafts(&self, drafts: Vec<PendingDraft>) -> (usize, Vec<String>) {
    if drafts.is_empty() {
      return (0, Vec::new());
    }
    debug!(count = drafts.len(), "draining pending drafts");
    self.drain(drafts, |draft| self.push_draft(draft)).await
  }

  /// Upload images, create the poll, then delete the draft.
  async fn push_draft(&self, mut draft: PendingDraft) -> Result<(), String> {
    let title = draft.title.clone();

    let before = (draft.option_a.image.clone(), draft.option_b.image.clone());
    let uploads = async {
      let a = self.resolve_image(&mut draft.option_a, &title).await?;
      let b = self.resolve_image(&mut draft.option_b, &title).await?;
      Ok::<_, String>((a, b))
    }
    .await;

    // Keep uploaded URLs so a retry does not upload again
    if (draft.option_a.image.clone(), draft.option_b.image.clone()) != before {
      draft.updated_at = Utc::now();
      if let Err(e) = self.store.put_draft(&draft) {
        warn!(draft_id = %draft.id, "could not record uploaded images: {}", e);
        let note = format!("Failed to record uploaded images for draft '{}': {}", title, e);
        return Err(match uploads {
          Err(upload) => format!("{}; {}", upload, note),
          Ok(_) => note,
        });
      }
    }

    let (image_a, image_b) = uploads?;
    let request = NewPoll::from_draft(&draft, image_a, image_b);

    let created = self
      .remote(self.gateway.insert_poll(&request))
      .await
      .map_err(|e| {
        warn!(draft_id = %draft.id, "poll create failed: {}", e);
        format!("Failed to create poll '{}': {}", title, e)
      })?;

    self
      .store
      .delete_draft(&draft.id)
      .map_err(|e| format!("Poll '{}' created but draft not removed: {}", title, e))?;

    debug!(draft_id = %draft.id, poll_id = %created.id, "draft published");
    Ok(())
  }

  /// The URL of an option's image, uploading pending bytes first.
  async fn resolve_image(
    &self,
    option: &mut DraftOption,
    title: &str,
  ) -> Result<Option<String>, String> {
    let url = match &option.image {
      None => return Ok(None),
      Some(DraftImage::Uploaded { url }) => return Ok(Some(url.clone())),
      Some(DraftImage::Pending { data, content_type }) => {
        let key = DraftImage::asset_key(data);
        let asset = AssetUpload {
          key: &key,
          content_type,
          data,
        };
        self
          .remote(self.gateway.upload_asset(asset))
          .await
          .map_err(|e| {
            warn!(title, "image upload failed: {}", e);
            format!("Failed to upload image for draft '{}': {}", title, e)
          })?
      }
    };

    option.image = Some(DraftImage::Uploaded { url: url.clone() });
    Ok(Some(url))
  }
}

use async_trait::async_trait;
use tracing::warn;

use crate::error::{CrawlError, Result};
use crate::item::Item;

#[async_trait]
pub trait ItemPipeline: Send + Sync {
    /// Transforms or drops an item. Returning `None` drops it and stops the
    /// chain; returning `Some` passes the (possibly modified) item to the
    /// next stage.
    async fn process_item(&self, item: Item) -> Result<Option<Item>>;

    /// Runs if an earlier stage raised. Returning `true` swallows the error
    /// and drops the item; `false` lets the next pipeline try.
    async fn process_exception(&self, _item: &Item, _error: &CrawlError) -> Result<bool> {
        Ok(false)
    }
}

/// Runs the item pipeline chain in registration order.
#[derive(Default)]
pub struct ItemPipelineChain {
    stages: Vec<Box<dyn ItemPipeline>>,
}

impl ItemPipelineChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Box<dyn ItemPipeline>) {
        self.stages.push(stage);
    }

    /// Drains `item` through every stage. Returns `None` if any stage drops
    /// it or an exception is swallowed.
    pub async fn process(&self, mut item: Item) -> Result<Option<Item>> {
        for stage in &self.stages {
            let outcome = stage.process_item(item.clone()).await;
            match outcome {
                Ok(Some(next)) => item = next,
                Ok(None) => return Ok(None),
                Err(e @ CrawlError::InvalidOutput(_)) => return Err(e),
                Err(e) => {
                    self.run_exception_chain(&item, e).await?;
                    return Ok(None);
                }
            }
        }
        Ok(Some(item))
    }

    async fn run_exception_chain(&self, item: &Item, error: CrawlError) -> Result<bool> {
        for stage in &self.stages {
            if stage.process_exception(item, &error).await? {
                return Ok(true);
            }
        }
        warn!(item = %item.item_name, %error, "unhandled item pipeline exception");
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AddField;

    #[async_trait]
    impl ItemPipeline for AddField {
        async fn process_item(&self, item: Item) -> Result<Option<Item>> {
            Ok(Some(item.with("seen", true)))
        }
    }

    struct DropEverything;

    #[async_trait]
    impl ItemPipeline for DropEverything {
        async fn process_item(&self, _item: Item) -> Result<Option<Item>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn stages_run_in_order() {
        let mut chain = ItemPipelineChain::new();
        chain.push(Box::new(AddField));
        let result = chain.process(Item::new("x")).await.unwrap().unwrap();
        assert_eq!(result.get("seen").unwrap(), true);
    }

    #[tokio::test]
    async fn a_stage_can_drop_the_item() {
        let mut chain = ItemPipelineChain::new();
        chain.push(Box::new(DropEverything));
        chain.push(Box::new(AddField));
        let result = chain.process(Item::new("x")).await.unwrap();
        assert!(result.is_none());
    }
}

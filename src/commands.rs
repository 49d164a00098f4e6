//! CLI subcommands and their handlers.
//!
//! List commands play the part of navigation (they read through the query
//! cache); the add/update/delete commands are mutation handlers that clear
//! the affected cache entries and then read the resource again.

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::api::{
  has_feature_permission, LinkUpdate, NewLink, NewTag, Queries, TagUpdate, AI_SUMMARY_FEATURE,
};
use crate::output;
use crate::query::{QueryController, QueryError, QueryEventKind};

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// List saved links
  Links,
  /// List tags
  Tags,
  /// List enabled features, or check a single one
  Permissions {
    /// Exit with an error unless this feature is enabled
    #[arg(long)]
    check: Option<String>,
  },
  /// Save a new link
  AddLink {
    name: String,
    url: String,
    /// Tag id to attach (repeatable)
    #[arg(long = "tag")]
    tags: Vec<String>,
  },
  /// Replace a link's name, url and tags
  UpdateLink {
    id: String,
    name: String,
    url: String,
    #[arg(long = "tag")]
    tags: Vec<String>,
  },
  /// Delete a link
  DeleteLink { id: String },
  /// Create a tag
  AddTag {
    name: String,
    #[arg(long, default_value = "default")]
    color: String,
  },
  /// Rename or recolor a tag
  UpdateTag {
    id: String,
    name: String,
    #[arg(long, default_value = "default")]
    color: String,
  },
  /// Delete a tag
  DeleteTag { id: String },
  /// Summarize the page behind a link (needs the ai_summary feature)
  AiSummary { link_id: String },
  /// Re-read links on an interval, serving cached data while refreshing
  Watch {
    /// Seconds between reads
    #[arg(long, default_value_t = 5)]
    interval: u64,
    /// Stop after this many reads
    #[arg(long)]
    count: Option<u32>,
  },
}

pub async fn run(queries: &Queries, command: Command) -> Result<()> {
  match command {
    Command::Links => show(&queries.links, |links| output::format_links(links)).await,
    Command::Tags => show(&queries.tags, |tags| output::format_tags(tags)).await,
    Command::Permissions { check } => {
      let Some(permissions) = read(&queries.feature_permissions).await? else {
        return Ok(());
      };
      match check {
        Some(feature) if has_feature_permission(&feature, &permissions) => {
          println!("{}: enabled", feature);
          Ok(())
        }
        Some(feature) => Err(eyre!("Feature '{}' is not enabled", feature)),
        None => {
          println!("{}", output::format_permissions(&permissions));
          Ok(())
        }
      }
    }
    Command::AddLink { name, url, tags } => {
      let link = queries
        .create_link(&NewLink {
          name,
          url,
          tag_ids: tags,
        })
        .await?;
      println!("Saved link {}", link.id);
      show(&queries.links, |links| output::format_links(links)).await
    }
    Command::UpdateLink {
      id,
      name,
      url,
      tags,
    } => {
      queries
        .update_link(&LinkUpdate {
          id,
          name,
          url,
          tag_ids: tags,
        })
        .await?;
      show(&queries.links, |links| output::format_links(links)).await
    }
    Command::DeleteLink { id } => {
      queries.delete_link(&id).await?;
      println!("Deleted link {}", id);
      show(&queries.links, |links| output::format_links(links)).await
    }
    Command::AddTag { name, color } => {
      let tag = queries.create_tag(&NewTag { name, color }).await?;
      println!("Created tag {}", tag.id);
      show(&queries.tags, |tags| output::format_tags(tags)).await
    }
    Command::UpdateTag { id, name, color } => {
      queries.update_tag(&TagUpdate { id, name, color }).await?;
      show(&queries.tags, |tags| output::format_tags(tags)).await
    }
    Command::DeleteTag { id } => {
      queries.delete_tag(&id).await?;
      println!("Deleted tag {}", id);
      show(&queries.tags, |tags| output::format_tags(tags)).await
    }
    Command::AiSummary { link_id } => {
      let Some(permissions) = read(&queries.feature_permissions).await? else {
        return Ok(());
      };
      if !has_feature_permission(AI_SUMMARY_FEATURE, &permissions) {
        return Err(eyre!(
          "AI summaries are not enabled for this account ('{}' permission missing)",
          AI_SUMMARY_FEATURE
        ));
      }
      let summary = queries.link_ai_summary(&link_id).await?;
      println!("{}", summary);
      Ok(())
    }
    Command::Watch { interval, count } => watch(queries, Duration::from_secs(interval), count).await,
  }
}

/// Read a resource through its controller.
///
/// `None` means a newer read took over; there is nothing to show and
/// nothing went wrong.
async fn read<T, E>(query: &QueryController<T, E>) -> Result<Option<T>>
where
  T: Clone + Send + Sync + 'static,
  E: Display + Send + Sync + std::error::Error + 'static,
{
  match query.get_data().await {
    Ok(data) => Ok(Some(data)),
    Err(QueryError::Fetch(e)) => Err(e.into()),
    Err(QueryError::Superseded) => {
      debug!(key = query.cache_key(), "read superseded by a newer one");
      eprintln!("Read of '{}' was replaced by a newer one", query.cache_key());
      Ok(None)
    }
  }
}

async fn show<T, E, F>(query: &QueryController<T, E>, render: F) -> Result<()>
where
  T: Clone + Send + Sync + 'static,
  E: Display + Send + Sync + std::error::Error + 'static,
  F: FnOnce(&T) -> String,
{
  if let Some(data) = read(query).await? {
    println!("{}", render(&data));
  }
  Ok(())
}

/// Keep reading links, printing each result as it is served.
///
/// After the first read every tick is a cache hit: the printed list is the
/// one fetched in the background during the previous tick.
async fn watch(queries: &Queries, interval: Duration, count: Option<u32>) -> Result<()> {
  if interval.is_zero() {
    return Err(eyre!("--interval must be at least 1 second"));
  }
  if count == Some(0) {
    return Err(eyre!("--count must be at least 1"));
  }

  let mut events = queries.links.subscribe();
  let listener = tokio::spawn(async move {
    loop {
      let event = match events.recv().await {
        Ok(event) => event,
        Err(RecvError::Lagged(_)) => continue,
        Err(RecvError::Closed) => break,
      };
      match event.kind {
        QueryEventKind::Evicted(error) => {
          info!(key = %event.key, %error, "refresh failed, cached links dropped")
        }
        kind => info!(key = %event.key, ?kind, "query event"),
      }
    }
  });

  let mut ticker = tokio::time::interval(interval);
  let mut reads = 0u32;

  loop {
    tokio::select! {
      _ = ticker.tick() => {}
      _ = tokio::signal::ctrl_c() => break,
    }

    match queries.links.get_data().await {
      Ok(links) => println!("{} link(s)\n{}\n", links.len(), output::format_links(&links)),
      Err(QueryError::Fetch(e)) => eprintln!("Failed to load links: {}", e),
      Err(QueryError::Superseded) => {}
    }

    reads += 1;
    if count.is_some_and(|max| reads >= max) {
      break;
    }
  }

  listener.abort();
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::{ApiClient, ApiError};
  use crate::cache::CacheStore;
  use crate::cancel::CancelSignal;
  use crate::query::{FetchError, RevalidateMode};
  use clap::Parser;
  use std::sync::Arc;

  #[derive(Parser, Debug)]
  struct Cli {
    #[command(subcommand)]
    command: Command,
  }

  fn parse(args: &[&str]) -> Command {
    let mut argv = vec!["linkq"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap().command
  }

  #[test]
  fn test_parse_add_link_with_tags() {
    let command = parse(&["add-link", "Docs", "https://docs.rs", "--tag", "t1", "--tag", "t2"]);
    assert_eq!(
      command,
      Command::AddLink {
        name: "Docs".to_string(),
        url: "https://docs.rs".to_string(),
        tags: vec!["t1".to_string(), "t2".to_string()],
      }
    );
  }

  #[test]
  fn test_parse_add_tag_default_color() {
    let command = parse(&["add-tag", "reading"]);
    assert_eq!(
      command,
      Command::AddTag {
        name: "reading".to_string(),
        color: "default".to_string(),
      }
    );
  }

  #[test]
  fn test_parse_watch_defaults() {
    assert_eq!(
      parse(&["watch"]),
      Command::Watch {
        interval: 5,
        count: None
      }
    );
  }

  #[test]
  fn test_parse_permissions_check() {
    assert_eq!(
      parse(&["permissions", "--check", "ai_summary"]),
      Command::Permissions {
        check: Some("ai_summary".to_string())
      }
    );
  }

  #[test]
  fn test_parse_ai_summary() {
    assert_eq!(
      parse(&["ai-summary", "l1"]),
      Command::AiSummary {
        link_id: "l1".to_string()
      }
    );
  }

  fn queries_for(server: &mockito::ServerGuard) -> Queries {
    let client = ApiClient::from_parts(&server.url(), None, Duration::from_secs(5)).unwrap();
    Queries::new(client, Arc::new(CacheStore::new()), RevalidateMode::Never)
  }

  fn permissions_body(features: &[&str]) -> String {
    let permissions: Vec<String> = features
      .iter()
      .map(|name| {
        format!(
          r#"{{ "id": "p-{0}", "featureName": "{0}", "createdAt": "2025-01-01T00:00:00Z", "updatedAt": "2025-01-01T00:00:00Z" }}"#,
          name
        )
      })
      .collect();
    format!(r#"{{ "permissions": [{}] }}"#, permissions.join(", "))
  }

  #[tokio::test]
  async fn test_ai_summary_requests_summary_when_permitted() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("GET", "/feature-permissions")
      .with_header("content-type", "application/json")
      .with_body(permissions_body(&[AI_SUMMARY_FEATURE]))
      .create_async()
      .await;
    let summary = server
      .mock("POST", "/links/l1/ai-summary")
      .with_header("content-type", "application/json")
      .with_body(r#"{ "data": "- **Rust** - A systems language" }"#)
      .create_async()
      .await;

    let queries = queries_for(&server);
    run(&queries, Command::AiSummary { link_id: "l1".to_string() })
      .await
      .unwrap();

    summary.assert_async().await;
  }

  #[tokio::test]
  async fn test_ai_summary_requires_permission() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("GET", "/feature-permissions")
      .with_header("content-type", "application/json")
      .with_body(permissions_body(&[]))
      .create_async()
      .await;
    let summary = server
      .mock("POST", "/links/l1/ai-summary")
      .expect(0)
      .create_async()
      .await;

    let queries = queries_for(&server);
    let err = run(&queries, Command::AiSummary { link_id: "l1".to_string() })
      .await
      .unwrap_err();

    assert!(err.to_string().contains(AI_SUMMARY_FEATURE));
    summary.assert_async().await;
  }

  #[tokio::test]
  async fn test_watch_rejects_zero_count() {
    let mut server = mockito::Server::new_async().await;
    let links = server.mock("GET", "/links").expect(0).create_async().await;

    let queries = queries_for(&server);
    let err = run(
      &queries,
      Command::Watch {
        interval: 1,
        count: Some(0),
      },
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("--count"));
    links.assert_async().await;
  }

  #[tokio::test]
  async fn test_superseded_read_is_not_an_error() {
    let store = Arc::new(CacheStore::new());
    let query: QueryController<Vec<String>, ApiError> =
      QueryController::new(store, "links", |signal: CancelSignal| async move {
        signal.cancelled().await;
        Err(FetchError::Cancelled)
      });

    let pending = tokio::spawn({
      let query = query.clone();
      async move { read(&query).await }
    });
    while !pending.is_finished() {
      query.cancel();
      tokio::task::yield_now().await;
    }

    assert_eq!(pending.await.unwrap().unwrap(), None);
  }

  #[test]
  fn test_parse_rejects_unknown_command() {
    assert!(Cli::try_parse_from(["linkq", "boards"]).is_err());
  }
}

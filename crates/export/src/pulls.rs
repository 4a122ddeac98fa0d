use anyhow::Result;
use landed_core::models::Change;
use landed_db::Database;
use landed_github::PullRequestStore;
use maud::{DOCTYPE, Markup, html};
use time::{OffsetDateTime, macros::format_description};

pub const PULLS_LIMIT: u32 = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct LandedPull {
    pub number: u64,
    pub changeset: String,
    pub time: i64,
    /// `None` when the metadata has not been retrieved.
    pub title: Option<String>,
}

pub async fn landed_pulls(
    db: &Database,
    store: &PullRequestStore,
    days: u32,
    now: i64,
) -> Result<Vec<LandedPull>> {
    let since = now - days as i64 * 86400;
    let mut out = Vec::new();
    let changes = db.get_landed_pulls(since, PULLS_LIMIT).await?;
    for Change { changeset, pull_request, time, .. } in changes {
        let Some(number) = pull_request else {
            continue;
        };
        let title = match store.read(number) {
            Ok(info) => info.map(|info| info.title),
            Err(e) => {
                tracing::warn!("Failed to read #{}: {:?}", number, e);
                None
            }
        };
        out.push(LandedPull { number, changeset, time, title });
    }
    Ok(out)
}

fn format_time(time: i64) -> String {
    OffsetDateTime::from_unix_timestamp(time)
        .ok()
        .and_then(|t| t.format(format_description!("[year]-[month]-[day] [hour]:[minute]")).ok())
        .unwrap_or_else(|| time.to_string())
}

pub fn render_pull_list(owner: &str, repo: &str, pulls: &[LandedPull]) -> Markup {
    let repo_url = format!("https://github.com/{owner}/{repo}");
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                title { "Landed pull requests" }
                link rel="stylesheet" href="style.css";
            }
            body {
                table class="prs" {
                    thead {
                        tr {
                            th { "PR" }
                            th { "Title" }
                            th { "Landed" }
                            th { "Commit" }
                            th { "Graphs" }
                        }
                    }
                    tbody {
                        @for pull in pulls {
                            tr class="pr" id={ "pr-" (pull.number) } {
                                td class="pr-number" {
                                    a href={ (repo_url) "/pull/" (pull.number) } {
                                        (pull.number)
                                    }
                                }
                                td class="pr-title" {
                                    @match &pull.title {
                                        Some(title) => { (title) }
                                        None => { small { "Unknown" } }
                                    }
                                }
                                td class="pr-time" { (format_time(pull.time)) }
                                td class="pr-hash" {
                                    a href={ (repo_url) "/commit/" (pull.changeset) } {
                                        (pull.changeset.get(..8).unwrap_or(&pull.changeset))
                                    }
                                }
                                td class="pr-graphs" {
                                    a href={ "../mem/#" (pull.changeset) } { "mem" }
                                    " "
                                    a href={ "../buildbot/#" (pull.changeset) } { "buildbot" }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

pub(crate) mod types;
pub(crate) mod parser;
pub(crate) mod github;
pub(crate) mod search;
pub(crate) mod store;
pub(crate) mod pawzhub;

pub use types::{CommunitySkill, DiscoveredSkill};
pub use parser::parse_skill_md;
pub use github::{fetch_repo_skills, install_community_skill};
pub use search::search_community_skills;
pub use store::get_community_skill_instructions;
pub use pawzhub::{PawzHubEntry, search_pawzhub, browse_pawzhub_category, fetch_pawzhub_toml};

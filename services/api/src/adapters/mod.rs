pub mod preferences;
pub mod supabase;

pub use preferences::FilePreferenceStore;
pub use supabase::SupabaseAdapter;

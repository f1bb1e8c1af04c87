pub mod agendas;
pub mod run;
pub mod status;

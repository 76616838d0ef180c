mod run;
mod station_memo;
mod support;

mod test_close_during_answer;
mod test_pending_calls;
mod test_restart_and_stop;
